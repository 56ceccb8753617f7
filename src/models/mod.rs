mod asset;
mod item;
mod record;
mod source;

pub use asset::{AssetHandle, LocalAsset};
pub use item::FeedItem;
pub use record::{ContentBlock, ContentRecord, NewContentRecord};
pub use source::{BodySource, FeedSource, ImageSettings, NewFeedSource, SubtitleSource};
