/// Build the HTML reply body: a link to the translator, labelled `src→dst`.
pub fn translation_link(translate_url: &str, text: &str, source: &str, target: &str) -> String {
    format!(
        "<a href=\"{url}/#{src}/{dst}/{text}\">{src_label}→{dst_label}</a>",
        url = translate_url,
        src = urlencoding::encode(source),
        dst = urlencoding::encode(target),
        text = urlencoding::encode(text),
        src_label = escape_html(source),
        dst_label = escape_html(target),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_format() {
        let reply = translation_link("http://translate.google.com", "Bonjour", "fr", "en");
        assert_eq!(
            reply,
            "<a href=\"http://translate.google.com/#fr/en/Bonjour\">fr→en</a>"
        );
    }

    #[test]
    fn test_text_is_percent_encoded() {
        let reply = translation_link(
            "http://translate.google.com",
            "Ça va? <b>oui</b> & 1/2",
            "fr",
            "en",
        );
        assert!(reply.contains("/#fr/en/%C3%87a%20va%3F%20%3Cb%3Eoui%3C%2Fb%3E%20%26%201%2F2\""));
        assert!(!reply.contains("<b>"));
    }

    #[test]
    fn test_label_uses_arrow() {
        let reply = translation_link("https://t.example", "Hallo Welt", "de", "es");
        assert!(reply.ends_with(">de→es</a>"));
    }
}
