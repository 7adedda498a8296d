use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bot token issued by @BotFather.
    pub api_key: String,
    /// Replies link into this language.
    pub target_language: String,
    /// Languages that never get a reply.
    #[serde(default, deserialize_with = "deserialize_language_list")]
    pub skip_languages: Vec<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_translate_url")]
    pub translate_url: String,
    /// Where the last processed update id lives. Relative paths resolve
    /// against the config file's directory.
    #[serde(default)]
    pub offset_path: Option<PathBuf>,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_translate_url() -> String {
    "http://translate.google.com".to_string()
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_poll_timeout_secs() -> u64 {
    30
}

const DEFAULT_OFFSET_FILE: &str = "update_id";

/// Accepts either `"fr,de"` or `["fr", "de"]`.
fn deserialize_language_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LanguageList {
        Csv(String),
        List(Vec<String>),
    }

    let raw = match LanguageList::deserialize(deserializer)? {
        LanguageList::Csv(s) => s.split(',').map(str::to_string).collect(),
        LanguageList::List(v) => v,
    };
    Ok(raw
        .iter()
        .map(|code| normalize_language(code))
        .filter(|code| !code.is_empty())
        .collect())
}

fn normalize_language(code: &str) -> String {
    code.trim().to_lowercase()
}

impl Config {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Offset file location; `update_id` next to the config when unset.
    pub fn offset_path(&self) -> PathBuf {
        self.offset_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OFFSET_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let offset_path = config.offset_path();
        if offset_path.is_relative() {
            config.offset_path = Some(base.join(offset_path));
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;

        config.api_key = config.api_key.trim().to_string();
        config.target_language = normalize_language(&config.target_language);
        config.api_base_url = config.api_base_url.trim_end_matches('/').to_string();
        config.translate_url = config.translate_url.trim_end_matches('/').to_string();

        if config.api_key.is_empty() {
            return Err(ConfigError::Invalid("api_key must not be empty".into()));
        }
        if config.target_language.is_empty() {
            return Err(ConfigError::Invalid(
                "target_language must not be empty".into(),
            ));
        }
        // Zero would turn a persistent fetch failure into a busy loop.
        if config.retry_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry_delay_secs must be at least 1".into(),
            ));
        }

        Ok(config)
    }
}
