use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::AssetHandle;
use super::source::{BodySource, ImageSettings};

/// A persisted article. At most one exists per `(source_id, guid)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: i64,
    pub source_id: i64,
    pub guid: String,
    pub headline: String,
    pub alias: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub tstamp: DateTime<Utc>,
    pub subheadline: String,
    pub teaser: String,
    pub image: Option<AssetHandle>,
    pub image_url: Option<String>,
    pub image_settings: ImageSettings,
    pub enclosures: Vec<AssetHandle>,
    pub body_source: BodySource,
    pub url: String,
    pub link: String,
    pub target: bool,
    pub published: bool,
    pub css_class: String,
}

impl ContentRecord {
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.tstamp.max(self.date)
    }

    /// Every asset handle this record refers to, image first.
    pub fn asset_handles(&self) -> Vec<AssetHandle> {
        let mut handles: Vec<AssetHandle> = self.image.into_iter().collect();
        for handle in &self.enclosures {
            if !handles.contains(handle) {
                handles.push(*handle);
            }
        }
        handles
    }
}

/// Record fields derived from a feed item, before identity and assets exist.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentRecord {
    pub source_id: i64,
    pub guid: String,
    pub headline: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub tstamp: DateTime<Utc>,
    pub subheadline: String,
    pub teaser: String,
    pub image_url: Option<String>,
    pub image_settings: ImageSettings,
    pub body_source: BodySource,
    pub url: String,
    pub link: String,
    pub target: bool,
    pub published: bool,
    pub css_class: String,
}

impl NewContentRecord {
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.tstamp.max(self.date)
    }
}

/// Child records making up a record's body. Replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Hyperlink {
        title_text: String,
        url: String,
        link_title: String,
        target: bool,
    },
}

impl ContentBlock {
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Hyperlink { .. } => "hyperlink",
        }
    }

    pub fn sorting(&self) -> i64 {
        match self {
            ContentBlock::Text { .. } => 128,
            ContentBlock::Hyperlink { .. } => 256,
        }
    }
}
