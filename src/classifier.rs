use lingua::{LanguageDetector, LanguageDetectorBuilder};
use tracing::info;

use crate::error::ClassificationError;

/// Lowercase ISO 639-1 code, e.g. `"fr"`.
pub type LanguageCode = String;

/// Anything that can name the language a piece of text is written in.
pub trait LanguageClassifier: Send + Sync {
    fn detect(&self, text: &str) -> Result<LanguageCode, ClassificationError>;
}

/// Statistical detector backed by lingua's n-gram models.
pub struct LinguaClassifier {
    detector: LanguageDetector,
}

impl LinguaClassifier {
    /// Detector covering every language lingua ships models for.
    pub fn new() -> Self {
        info!("Language detector configured for all supported languages");
        Self {
            detector: LanguageDetectorBuilder::from_all_languages().build(),
        }
    }

    /// Small candidate set so tests do not load every model.
    #[cfg(test)]
    fn with_languages(languages: &[lingua::Language]) -> Self {
        Self {
            detector: LanguageDetectorBuilder::from_languages(languages).build(),
        }
    }
}

impl LanguageClassifier for LinguaClassifier {
    fn detect(&self, text: &str) -> Result<LanguageCode, ClassificationError> {
        if text.trim().is_empty() {
            return Err(ClassificationError::EmptyText);
        }
        self.detector
            .detect_language_of(text)
            .map(|language| language.iso_code_639_1().to_string())
            .ok_or(ClassificationError::Undetermined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingua::Language;

    fn classifier() -> LinguaClassifier {
        LinguaClassifier::with_languages(&[Language::English, Language::French, Language::German])
    }

    #[test]
    fn test_detects_french() {
        let lang = classifier()
            .detect("Bonjour à tous, je voudrais savoir où se trouve la gare aujourd'hui.")
            .unwrap();
        assert_eq!(lang, "fr");
    }

    #[test]
    fn test_detects_english() {
        let lang = classifier()
            .detect("The quick brown fox jumps over the lazy dog near the river bank.")
            .unwrap();
        assert_eq!(lang, "en");
    }

    #[test]
    fn test_blank_text_is_error() {
        assert_eq!(
            classifier().detect("   \n"),
            Err(ClassificationError::EmptyText)
        );
    }

    #[test]
    fn test_no_letters_is_undetermined() {
        assert_eq!(
            classifier().detect("12345 !!! ???"),
            Err(ClassificationError::Undetermined)
        );
    }
}
