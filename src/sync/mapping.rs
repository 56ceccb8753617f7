use crate::models::{BodySource, ContentBlock, FeedItem, FeedSource, NewContentRecord, SubtitleSource};
use crate::text::{clean_body, normalize_teaser, AllowedTags, TeaserPolicy};

/// Everything the synchronizer writes for one feed item, minus identity and
/// localized assets.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedItem {
    pub record: NewContentRecord,
    pub blocks: Vec<ContentBlock>,
    pub enclosures: Vec<String>,
}

pub fn prepare_item(source: &FeedSource, item: &FeedItem, read_more_label: &str) -> PreparedItem {
    let allowed = AllowedTags::parse(&source.allowed_tags);
    let policy = if source.teaser_html {
        TeaserPolicy::AllowList(&allowed)
    } else {
        TeaserPolicy::Strip {
            truncate: source.truncate,
        }
    };
    let teaser = normalize_teaser(item.description.as_deref().unwrap_or_default(), policy);

    let mut blocks = Vec::new();
    let body_source = match source.body_source {
        BodySource::Content => {
            let body = clean_body(item.content.as_deref().unwrap_or_default(), &allowed);
            if !body.is_empty() {
                blocks.push(ContentBlock::Text { text: body });
            }
            if !item.link.is_empty() {
                blocks.push(ContentBlock::Hyperlink {
                    title_text: item.title.clone(),
                    url: item.link.clone(),
                    link_title: read_more_label.to_string(),
                    target: true,
                });
            }
            BodySource::Default
        }
        other => {
            if !teaser.is_empty() {
                blocks.push(ContentBlock::Text {
                    text: teaser.clone(),
                });
            }
            other
        }
    };

    let record = NewContentRecord {
        source_id: source.id,
        guid: item.guid.clone(),
        headline: item.title.clone(),
        author: source.author.clone(),
        date: item.published.unwrap_or_default(),
        tstamp: item.updated.unwrap_or_default(),
        subheadline: subtitle(source.subtitle_source, item),
        teaser,
        image_url: item.image.clone().filter(|url| !url.is_empty()),
        image_settings: source.image.clone(),
        body_source,
        url: item.link.clone(),
        link: item.link.clone(),
        target: source.target,
        published: source.published,
        css_class: source.css_class.clone(),
    };

    PreparedItem {
        record,
        blocks,
        enclosures: item.enclosures.clone(),
    }
}

fn subtitle(selection: SubtitleSource, item: &FeedItem) -> String {
    match selection {
        SubtitleSource::Category => item.categories.join(", "),
        SubtitleSource::Contributor => item.contributor.clone().unwrap_or_default(),
        SubtitleSource::Rights => item.rights.clone().unwrap_or_default(),
        SubtitleSource::None => String::new(),
    }
}
