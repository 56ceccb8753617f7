use opml::{Outline, OPML};
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::NewFeedSource;

/// Reads every outline with an `xmlUrl` as a source owned by `archive_id`.
pub fn parse_opml_file(path: &Path, archive_id: i64, files_path: &str) -> Result<Vec<NewFeedSource>> {
    let content = std::fs::read_to_string(path)?;
    parse_opml(&content, archive_id, files_path)
}

pub fn parse_opml(content: &str, archive_id: i64, files_path: &str) -> Result<Vec<NewFeedSource>> {
    let opml = OPML::from_str(content).map_err(|e| AppError::OpmlParse(e.to_string()))?;

    let mut sources = Vec::new();
    collect_sources(&opml.body.outlines, archive_id, files_path, &mut sources);

    Ok(sources)
}

fn collect_sources(
    outlines: &[Outline],
    archive_id: i64,
    files_path: &str,
    sources: &mut Vec<NewFeedSource>,
) {
    for outline in outlines {
        if let Some(xml_url) = &outline.xml_url {
            let title = outline.title.as_deref().unwrap_or(&outline.text);
            sources.push(NewFeedSource::with_defaults(archive_id, title, xml_url, files_path));
        }

        // Folders nest further outlines
        if !outline.outlines.is_empty() {
            collect_sources(&outline.outlines, archive_id, files_path, sources);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_nested_feeds() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Top" xmlUrl="https://example.com/top.xml"/>
    <outline text="Folder">
      <outline text="Nested" title="Nested feed" xmlUrl="https://example.com/nested.xml"/>
    </outline>
  </body>
</opml>"#;

        let sources = parse_opml(content, 7, "files/news").unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Top");
        assert_eq!(sources[0].archive_id, 7);
        assert_eq!(sources[1].title, "Nested feed");
        assert_eq!(sources[1].url, "https://example.com/nested.xml");
        assert_eq!(sources[1].files_path, "files/news");
    }

    #[test]
    fn invalid_opml_is_reported() {
        assert!(matches!(
            parse_opml("<html></html>", 1, "files"),
            Err(AppError::OpmlParse(_))
        ));
    }
}
