use std::path::PathBuf;

use thiserror::Error;

/// Failure to fetch a batch of updates. Both kinds are retried by the poller.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Timeout, refused connection, DNS failure, broken body stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered, but not with something we can trust.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The classifier could not name a language. The update is skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("text is empty")]
    EmptyText,

    #[error("language could not be determined")]
    Undetermined,
}

/// Failure to deliver a reply. Logged and dropped, never retried.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rejected by API: {0}")]
    Rejected(String),
}

/// The offset could not be read or durably written. Fatal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("offset file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("offset file {} has corrupt content: {content:?}", .path.display())]
    Corrupt { path: PathBuf, content: String },
}

/// Configuration problems, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
