use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::{FeedError, SendError};
use crate::offset::Offset;
use crate::platform::{FeedBatch, IncomingMessage, ReplySender, Update, UpdateFeed};
use crate::reply::translation_link;

/// Extra time on top of the long-poll timeout before the HTTP request
/// itself is abandoned.
const HTTP_GRACE: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    allowed_updates: &'static [&'static str],
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<Offset>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
    parse_mode: &'static str,
}

/// Bot API client: long-polls `getUpdates` and posts via `sendMessage`.
pub struct TelegramClient {
    client: reqwest::Client,
    /// `{api_base_url}/bot{token}`. Never log this.
    base_url: String,
    translate_url: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", config.api_base_url, config.api_key),
            translate_url: config.translate_url.clone(),
            poll_timeout: config.poll_timeout(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

#[async_trait]
impl UpdateFeed for TelegramClient {
    async fn fetch(&self, after: Option<Offset>) -> Result<FeedBatch, FeedError> {
        let offset = match after {
            Some(id) => Some(id.checked_add(1).ok_or_else(|| {
                FeedError::Protocol(format!("no update can follow id {id}"))
            })?),
            None => None,
        };
        let request = GetUpdatesRequest {
            allowed_updates: &["message"],
            timeout: self.poll_timeout.as_secs(),
            offset,
        };

        // without_url(): the URL embeds the bot token.
        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&request)
            .timeout(self.poll_timeout + HTTP_GRACE)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.without_url().to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.without_url().to_string()))?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| FeedError::Protocol(format!("getUpdates response is not JSON: {e}")))?;

        let result = check_envelope(&value)?;
        parse_updates(result, after)
    }
}

#[async_trait]
impl ReplySender for TelegramClient {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<(), SendError> {
        let reply = translation_link(&self.translate_url, text, source_lang, target_lang);
        let request = SendMessageRequest {
            chat_id,
            text: &reply,
            disable_web_page_preview: true,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&request)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| SendError::Malformed(format!("sendMessage response is not JSON: {e}")))?;

        match value.get("ok") {
            Some(Value::Bool(true)) => Ok(()),
            Some(_) => Err(SendError::Rejected(
                api_description(&value).unwrap_or("ok is not true").to_string(),
            )),
            None => Err(SendError::Rejected("response has no ok field".to_string())),
        }
    }
}

fn api_description(value: &Value) -> Option<&str> {
    value.get("description").and_then(Value::as_str)
}

/// Require `{"ok": true, "result": [...]}` and hand back the array.
fn check_envelope(value: &Value) -> Result<&[Value], FeedError> {
    if value.get("ok").and_then(Value::as_bool) != Some(true) {
        let description = api_description(value).unwrap_or("ok is not true");
        return Err(FeedError::Protocol(format!(
            "getUpdates failed: {description}"
        )));
    }
    value
        .get("result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| FeedError::Protocol("getUpdates result is missing or not an array".into()))
}

/// Drop what we cannot or need not process, then order by id.
fn parse_updates(result: &[Value], after: Option<Offset>) -> Result<FeedBatch, FeedError> {
    let mut updates = Vec::with_capacity(result.len());
    let mut last_seen: Option<Offset> = None;

    for raw in result {
        let update = raw
            .as_object()
            .ok_or_else(|| FeedError::Protocol("update is not an object".into()))?;
        let id_value = update
            .get("update_id")
            .ok_or_else(|| FeedError::Protocol("update has no update_id".into()))?;

        let Some(update_id) = id_value.as_i64() else {
            debug!("Skipping update with non-integer id: {}", id_value);
            continue;
        };
        if after.is_some_and(|after| update_id <= after) {
            debug!("Skipping already processed update {}", update_id);
            continue;
        }
        last_seen = last_seen.max(Some(update_id));

        match parse_message(update) {
            Some(message) => updates.push(Update { update_id, message }),
            None => debug!("Skipping update {}: no text message", update_id),
        }
    }

    updates.sort_by_key(|u| u.update_id);
    updates.dedup_by_key(|u| u.update_id);

    Ok(FeedBatch { updates, last_seen })
}

fn parse_message(update: &Map<String, Value>) -> Option<IncomingMessage> {
    let message = update.get("message")?.as_object()?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;
    let text = message.get("text")?.as_str()?;
    Some(IncomingMessage {
        chat_id,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const TOKEN: &str = "123:secret";

    fn client_for(base_url: &str) -> TelegramClient {
        let config = Config::parse(&format!(
            "api_key = \"{TOKEN}\"\n\
             target_language = \"en\"\n\
             api_base_url = \"{base_url}\"\n\
             translate_url = \"http://translate.example\"\n\
             poll_timeout_secs = 0\n"
        ))
        .unwrap();
        TelegramClient::new(&config)
    }

    fn text_update(update_id: i64, chat_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id * 10,
                "chat": { "id": chat_id, "type": "private" },
                "text": text
            }
        })
    }

    fn ids(batch: &FeedBatch) -> Vec<i64> {
        batch.updates.iter().map(|u| u.update_id).collect()
    }

    #[test]
    fn test_parse_sorts_and_drops_processed() {
        let result = vec![
            text_update(5, 1, "a"),
            text_update(2, 1, "b"),
            text_update(9, 1, "c"),
            text_update(2, 1, "d"),
        ];
        let batch = parse_updates(&result, Some(3)).unwrap();
        assert_eq!(ids(&batch), vec![5, 9]);
        assert_eq!(batch.last_seen, Some(9));
    }

    #[test]
    fn test_parse_without_offset_keeps_everything() {
        let result = vec![text_update(9, 1, "c"), text_update(2, 1, "b")];
        let batch = parse_updates(&result, None).unwrap();
        assert_eq!(ids(&batch), vec![2, 9]);
    }

    #[test]
    fn test_parse_keeps_first_of_duplicate_ids() {
        let result = vec![text_update(7, 1, "first"), text_update(7, 1, "second")];
        let batch = parse_updates(&result, None).unwrap();
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].message.text, "first");
    }

    #[test]
    fn test_parse_drops_unprocessable_updates() {
        let result = vec![
            json!({ "update_id": 10, "message": { "chat": { "id": 1 } } }),
            json!({ "update_id": 11 }),
            json!({ "update_id": "12", "message": { "chat": { "id": 1 }, "text": "x" } }),
            json!({ "update_id": 13, "message": { "chat": {}, "text": "x" } }),
            json!({ "update_id": 14, "message": { "text": "x" } }),
            json!({ "update_id": 15, "message": { "chat": { "id": 1 }, "text": 42 } }),
            text_update(16, -100123, "ok"),
        ];
        let batch = parse_updates(&result, None).unwrap();

        assert_eq!(ids(&batch), vec![16]);
        assert_eq!(
            batch.updates[0].message,
            IncomingMessage {
                chat_id: -100123,
                text: "ok".into()
            }
        );
        // Filtered updates still count as seen; the string id does not.
        assert_eq!(batch.last_seen, Some(16));
    }

    #[test]
    fn test_parse_rejects_missing_update_id() {
        let result = vec![json!({ "message": { "chat": { "id": 1 }, "text": "x" } })];
        let err = parse_updates(&result, None).unwrap_err();
        assert!(matches!(err, FeedError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_non_object_update() {
        let err = parse_updates(&[json!(5)], None).unwrap_err();
        assert!(matches!(err, FeedError::Protocol(_)));
    }

    #[test]
    fn test_envelope_checks() {
        assert!(check_envelope(&json!({ "ok": true, "result": [] })).is_ok());
        assert!(check_envelope(&json!({ "ok": true, "result": {} })).is_err());
        assert!(check_envelope(&json!({ "ok": true })).is_err());
        assert!(check_envelope(&json!({ "ok": "true", "result": [] })).is_err());
        assert!(check_envelope(&json!({ "result": [] })).is_err());
    }

    #[tokio::test]
    async fn test_fetch_requests_next_offset_and_orders_result() {
        let server = MockServer::start_async().await;

        let updates_mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/bot{TOKEN}/getUpdates"))
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("\"offset\":4") && body.contains("\"allowed_updates\":[\"message\"]")
                });
            then.status(200).json_body(json!({
                "ok": true,
                "result": [
                    text_update(5, 1, "a"),
                    text_update(2, 1, "b"),
                    text_update(9, 1, "c"),
                    text_update(2, 1, "d")
                ]
            }));
        });

        let client = client_for(&server.base_url());
        let batch = client.fetch(Some(3)).await.unwrap();

        assert_eq!(ids(&batch), vec![5, 9]);
        updates_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_fetch_without_offset_omits_it() {
        let server = MockServer::start_async().await;

        let updates_mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/bot{TOKEN}/getUpdates"))
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    !body.contains("offset")
                });
            then.status(200)
                .json_body(json!({ "ok": true, "result": [text_update(1, 7, "hi")] }));
        });

        let client = client_for(&server.base_url());
        let batch = client.fetch(None).await.unwrap();

        assert_eq!(ids(&batch), vec![1]);
        updates_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_fetch_not_ok_is_protocol_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path(format!("/bot{TOKEN}/getUpdates"));
            then.status(401)
                .json_body(json!({ "ok": false, "error_code": 401, "description": "Unauthorized" }));
        });

        let client = client_for(&server.base_url());
        let err = client.fetch(None).await.unwrap_err();

        assert!(matches!(err, FeedError::Protocol(_)));
        assert!(format!("{err}").contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_fetch_non_json_is_protocol_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path(format!("/bot{TOKEN}/getUpdates"));
            then.status(502).body("<html>Bad Gateway</html>");
        });

        let client = client_for(&server.base_url());
        let err = client.fetch(None).await.unwrap_err();

        assert!(matches!(err, FeedError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_transport_error() {
        // Nothing listens on port 1.
        let client = client_for("http://127.0.0.1:1");
        let err = client.fetch(None).await.unwrap_err();

        assert!(matches!(err, FeedError::Transport(_)));
        assert!(!format!("{err}").contains(TOKEN));
    }

    #[tokio::test]
    async fn test_fetch_after_max_id_is_protocol_error() {
        // Nothing listens on port 1; the request must fail before it is sent.
        let client = client_for("http://127.0.0.1:1");
        let err = client.fetch(Some(i64::MAX)).await.unwrap_err();

        assert!(matches!(err, FeedError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_send_posts_html_link() {
        let server = MockServer::start_async().await;

        let send_mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/bot{TOKEN}/sendMessage"))
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains("\"chat_id\":42")
                        && body.contains("\"parse_mode\":\"HTML\"")
                        && body.contains("\"disable_web_page_preview\":true")
                        && body.contains("translate.example/#fr/en/Bonjour%20tout%20le%20monde")
                        && body.contains("fr→en</a>")
                });
            then.status(200)
                .json_body(json!({ "ok": true, "result": { "message_id": 1 } }));
        });

        let client = client_for(&server.base_url());
        client
            .send(42, "Bonjour tout le monde", "fr", "en")
            .await
            .unwrap();

        send_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_send_not_ok_is_rejected() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path(format!("/bot{TOKEN}/sendMessage"));
            then.status(400).json_body(
                json!({ "ok": false, "description": "Bad Request: chat not found" }),
            );
        });

        let client = client_for(&server.base_url());
        let err = client.send(1, "Hallo", "de", "en").await.unwrap_err();

        assert!(matches!(err, SendError::Rejected(_)));
        assert!(format!("{err}").contains("chat not found"));
    }

    #[tokio::test]
    async fn test_send_without_ok_field_is_rejected() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path(format!("/bot{TOKEN}/sendMessage"));
            then.status(200).json_body(json!({ "result": {} }));
        });

        let client = client_for(&server.base_url());
        let err = client.send(1, "Hallo", "de", "en").await.unwrap_err();

        assert!(matches!(err, SendError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_send_non_json_is_malformed() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path(format!("/bot{TOKEN}/sendMessage"));
            then.status(200).body("ok");
        });

        let client = client_for(&server.base_url());
        let err = client.send(1, "Hallo", "de", "en").await.unwrap_err();

        assert!(matches!(err, SendError::Malformed(_)));
    }
}
