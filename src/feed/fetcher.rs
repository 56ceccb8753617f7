use std::time::Duration;

use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;

use crate::config::HttpConfig;
use crate::error::{AppError, Result};
use crate::models::FeedItem;

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .user_agent(http.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Fetches and parses a feed. A blank URL is rejected before any request
    /// is made.
    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Configuration("empty URL".to_string()));
        }

        let fetch_error = |reason: String| AppError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let items = parse_feed(&bytes).map_err(|e| fetch_error(e.to_string()))?;

        tracing::debug!("Parsed {} items from {}", items.len(), url);
        Ok(items)
    }
}

/// Parses an RSS, Atom or JSON feed document into items, in document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(item_from_entry).collect())
}

fn item_from_entry(entry: Entry) -> FeedItem {
    let media_contents = entry.media.iter().flat_map(|media| media.content.iter());

    // Thumbnails first, then the first image-typed media object.
    let image = entry
        .media
        .iter()
        .flat_map(|media| media.thumbnails.iter())
        .map(|thumbnail| thumbnail.image.uri.clone())
        .next()
        .or_else(|| {
            media_contents
                .clone()
                .filter(|content| {
                    content
                        .content_type
                        .as_ref()
                        .is_some_and(|mime| mime.ty().as_str() == "image")
                })
                .find_map(|content| content.url.as_ref().map(|url| url.to_string()))
        });

    let mut enclosures: Vec<String> = Vec::new();
    let enclosure_links = entry
        .links
        .iter()
        .filter(|link| link.rel.as_deref() == Some("enclosure"))
        .map(|link| link.href.clone());
    let media_urls = media_contents.filter_map(|content| content.url.as_ref().map(|url| url.to_string()));
    for url in media_urls.chain(enclosure_links) {
        if !enclosures.contains(&url) {
            enclosures.push(url);
        }
    }

    let link = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|link| link.href.clone())
        .unwrap_or_default();

    FeedItem {
        guid: entry.id,
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        link,
        published: entry.published,
        updated: entry.updated,
        categories: entry
            .categories
            .into_iter()
            .map(|category| category.label.unwrap_or(category.term))
            .collect(),
        contributor: entry.contributors.first().map(|person| person.name.clone()),
        rights: entry.rights.map(|t| t.content),
        description: entry.summary.map(|t| t.content),
        content: entry.content.and_then(|c| c.body),
        image,
        enclosures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example News</title>
    <link>https://example.com</link>
    <description>News</description>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/first</link>
      <guid>abc</guid>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <category>Politics</category>
      <category>Local</category>
      <description>&lt;p&gt;Short teaser&lt;/p&gt;</description>
      <content:encoded><![CDATA[<p>Full <b>body</b></p>]]></content:encoded>
      <enclosure url="https://cdn.example.com/photo.jpg" length="100" type="image/jpeg"/>
      <enclosure url="https://cdn.example.com/episode.mp3" length="200" type="audio/mpeg"/>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/second</link>
      <guid>def</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items_in_order() {
        let items = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.guid, "abc");
        assert_eq!(first.title, "First & foremost");
        assert_eq!(first.link, "https://example.com/first");
        assert_eq!(first.categories, vec!["Politics", "Local"]);
        assert!(first.published.is_some());
        assert_eq!(first.content.as_deref(), Some("<p>Full <b>body</b></p>"));
        assert_eq!(first.image.as_deref(), Some("https://cdn.example.com/photo.jpg"));
        assert_eq!(
            first.enclosures,
            vec![
                "https://cdn.example.com/photo.jpg",
                "https://cdn.example.com/episode.mp3"
            ]
        );

        assert_eq!(items[1].guid, "def");
        assert!(items[1].enclosures.is_empty());
        assert!(items[1].image.is_none());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_feed(b"definitely not a feed").is_err());
    }

    #[tokio::test]
    async fn blank_url_is_rejected_before_fetching() {
        let fetcher = FeedFetcher::new(&HttpConfig::default()).unwrap();
        let err = fetcher.fetch_feed("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn fetches_feed_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed.xml")
            .with_status(200)
            .with_header("content-type", "application/rss+xml")
            .with_body(RSS)
            .create_async()
            .await;

        let fetcher = FeedFetcher::new(&HttpConfig::default()).unwrap();
        let items = fetcher
            .fetch_feed(&format!("{}/feed.xml", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn http_error_status_is_a_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.xml")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = FeedFetcher::new(&HttpConfig::default()).unwrap();
        let err = fetcher
            .fetch_feed(&format!("{}/missing.xml", server.url()))
            .await
            .unwrap_err();

        match err {
            AppError::Fetch { reason, .. } => assert!(reason.contains("404")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
