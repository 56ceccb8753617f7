use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing failed: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("OPML parsing failed: {0}")]
    OpmlParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(transparent)]
    Localization(#[from] LocalizationError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Every precondition a localization attempt violated, not only the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot make local copy of {url}: {}", .reasons.join("; "))]
pub struct LocalizationError {
    pub url: String,
    pub reasons: Vec<String>,
}

impl LocalizationError {
    pub fn new(url: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            reasons: vec![reason.into()],
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
