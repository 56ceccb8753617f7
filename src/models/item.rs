use chrono::{DateTime, Utc};

/// One entry of a fetched feed. Rebuilt on every fetch, never stored as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub contributor: Option<String>,
    pub rights: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub enclosures: Vec<String>,
}
