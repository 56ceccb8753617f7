use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which feed field fills a record's subheadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleSource {
    Category,
    Contributor,
    Rights,
    None,
}

impl SubtitleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleSource::Category => "category",
            SubtitleSource::Contributor => "contributor",
            SubtitleSource::Rights => "rights",
            SubtitleSource::None => "",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "category" => SubtitleSource::Category,
            "contributor" => SubtitleSource::Contributor,
            "rights" => SubtitleSource::Rights,
            _ => SubtitleSource::None,
        }
    }
}

/// Where a record's body comes from.
///
/// `Content` builds the body from the item's full content and adds a
/// "read more" link block. The record itself is then stored as `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySource {
    Content,
    Default,
    External,
}

impl BodySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodySource::Content => "content",
            BodySource::Default => "default",
            BodySource::External => "external",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "content" => BodySource::Content,
            "external" => BodySource::External,
            _ => BodySource::Default,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub margin: String,
    pub size: String,
    pub fullsize: bool,
    pub floating: String,
}

/// A configured subscription. Read-only while a sync runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: i64,
    pub archive_id: i64,
    pub title: String,
    pub url: String,
    pub enabled: bool,
    pub subtitle_source: SubtitleSource,
    /// Keep allow-listed HTML in teasers instead of stripping every tag.
    pub teaser_html: bool,
    pub allowed_tags: String,
    pub truncate: usize,
    pub author: String,
    pub target: bool,
    pub published: bool,
    pub image: ImageSettings,
    pub css_class: String,
    pub body_source: BodySource,
    /// Storage directory for localized attachments, relative to the storage root.
    pub files_path: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFeedSource {
    pub archive_id: i64,
    pub title: String,
    pub url: String,
    pub subtitle_source: SubtitleSource,
    pub teaser_html: bool,
    pub allowed_tags: String,
    pub truncate: usize,
    pub author: String,
    pub target: bool,
    pub published: bool,
    pub image: ImageSettings,
    pub css_class: String,
    pub body_source: BodySource,
    pub files_path: String,
}

impl NewFeedSource {
    /// A source with the default import policy: plain-text teasers, no truncation.
    pub fn with_defaults(archive_id: i64, title: &str, url: &str, files_path: &str) -> Self {
        Self {
            archive_id,
            title: title.to_string(),
            url: url.to_string(),
            subtitle_source: SubtitleSource::None,
            teaser_html: false,
            allowed_tags: String::new(),
            truncate: 0,
            author: String::new(),
            target: false,
            published: true,
            image: ImageSettings::default(),
            css_class: String::new(),
            body_source: BodySource::Default,
            files_path: files_path.to_string(),
        }
    }
}
