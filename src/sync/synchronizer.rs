use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::assets::{Localizer, Reaper};
use crate::config::SyncConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::FeedFetcher;
use crate::models::{AssetHandle, FeedItem, FeedSource};

use super::mapping::{prepare_item, PreparedItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Per-source summary of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub source_id: i64,
    pub url: String,
    pub status: SyncStatus,
    pub read: usize,
    pub inserted: usize,
    pub updated: usize,
}

impl SyncReport {
    fn new(source_id: i64, url: &str) -> Self {
        Self {
            source_id,
            url: url.to_string(),
            status: SyncStatus::Completed,
            read: 0,
            inserted: 0,
            updated: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Reads feeds and writes their items into content records.
pub struct Synchronizer {
    repo: Arc<Repository>,
    fetcher: FeedFetcher,
    localizer: Localizer,
    reaper: Reaper,
    concurrency: usize,
    read_more_label: String,
}

impl Synchronizer {
    pub fn new(
        repo: Arc<Repository>,
        fetcher: FeedFetcher,
        localizer: Localizer,
        reaper: Reaper,
        sync: &SyncConfig,
    ) -> Self {
        Self {
            repo,
            fetcher,
            localizer,
            reaper,
            concurrency: sync.concurrency.max(1),
            read_more_label: sync.read_more_label.clone(),
        }
    }

    /// Syncs every enabled source. Sources are independent, so a few run at
    /// once; reports come back ordered by source id.
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>> {
        let sources = self.repo.get_enabled_sources().await?;

        let mut reports: Vec<SyncReport> = stream::iter(sources.iter())
            .map(|source| self.sync_source(source))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        reports.sort_by_key(|report| report.source_id);

        Ok(reports)
    }

    pub async fn sync_source_by_id(&self, source_id: i64) -> SyncReport {
        match self.repo.get_source(source_id).await {
            Ok(Some(source)) if source.enabled => self.sync_source(&source).await,
            Ok(Some(source)) => self.finish(
                SyncReport::new(source_id, &source.url),
                Err(AppError::Configuration("source is disabled".to_string())),
            ),
            Ok(None) => self.finish(
                SyncReport::new(source_id, ""),
                Err(AppError::Configuration(format!("unknown source id {source_id}"))),
            ),
            Err(e) => self.finish(SyncReport::new(source_id, ""), Err(e)),
        }
    }

    /// Runs one source to completion. Errors end up in the report instead of
    /// propagating, so one bad feed never affects another.
    pub async fn sync_source(&self, source: &FeedSource) -> SyncReport {
        let mut report = SyncReport::new(source.id, &source.url);
        let result = self.run_source(source, &mut report).await;
        self.finish(report, result)
    }

    async fn run_source(&self, source: &FeedSource, report: &mut SyncReport) -> Result<()> {
        let items = self.fetcher.fetch_feed(&source.url).await?;
        self.sync_items(source, items, report).await?;
        self.repo.update_source_last_synced(source.id).await?;
        Ok(())
    }

    fn finish(&self, mut report: SyncReport, result: Result<()>) -> SyncReport {
        match result {
            Ok(()) => {
                report.status = SyncStatus::Completed;
                tracing::info!(
                    source_id = report.source_id,
                    url = %report.url,
                    "Rss/Atom items found: {} new: {} updated: {}",
                    report.read,
                    report.inserted,
                    report.updated
                );
            }
            Err(AppError::Configuration(reason)) => {
                tracing::warn!(source_id = report.source_id, url = %report.url, "Skipped source: {}", reason);
                report.status = SyncStatus::Skipped { reason };
            }
            Err(e) => {
                tracing::error!(source_id = report.source_id, url = %report.url, "Sync failed: {}", e);
                report.status = SyncStatus::Failed {
                    reason: e.to_string(),
                };
            }
        }
        report
    }

    /// Writes already fetched items for `source`, in order.
    pub async fn sync_items(
        &self,
        source: &FeedSource,
        items: Vec<FeedItem>,
        report: &mut SyncReport,
    ) -> Result<()> {
        for item in items {
            report.read += 1;
            match self.sync_item(source, &item).await? {
                ItemOutcome::Inserted => report.inserted += 1,
                ItemOutcome::Updated => report.updated += 1,
                ItemOutcome::Unchanged => {}
            }
        }
        Ok(())
    }

    async fn sync_item(&self, source: &FeedSource, item: &FeedItem) -> Result<ItemOutcome> {
        let PreparedItem {
            record,
            blocks,
            enclosures,
        } = prepare_item(source, item, &self.read_more_label);
        let image_url = record.image_url.clone();

        let Some(existing) = self.repo.find_record(source.id, &item.guid).await? else {
            let (id, alias) = self.repo.insert_record(record, blocks).await?;
            let (image, enclosures) = self
                .localize(source, id, image_url.as_deref(), &enclosures)
                .await;
            if image.is_some() || !enclosures.is_empty() {
                self.attach_assets(id, image, enclosures).await?;
            }
            tracing::debug!(source_id = source.id, record_id = id, %alias, "inserted record");
            return Ok(ItemOutcome::Inserted);
        };

        if existing.effective_timestamp() >= record.effective_timestamp() {
            return Ok(ItemOutcome::Unchanged);
        }

        // Old copies go first: the fresh ones reuse the same file names.
        let previous = existing.asset_handles();
        self.repo.set_record_assets(existing.id, None, Vec::new()).await?;
        self.reaper.reclaim(&previous).await?;

        self.repo.update_record(existing.id, record, blocks).await?;
        let (image, enclosures) = self
            .localize(source, existing.id, image_url.as_deref(), &enclosures)
            .await;
        self.attach_assets(existing.id, image, enclosures).await?;
        tracing::debug!(source_id = source.id, record_id = existing.id, "updated record");

        Ok(ItemOutcome::Updated)
    }

    /// Points the record at freshly stored assets. If that fails the assets
    /// have no owner, so their files are reclaimed before the error is returned.
    async fn attach_assets(
        &self,
        record_id: i64,
        image: Option<AssetHandle>,
        enclosures: Vec<AssetHandle>,
    ) -> Result<()> {
        let mut handles: Vec<AssetHandle> = image.into_iter().collect();
        for handle in &enclosures {
            if !handles.contains(handle) {
                handles.push(*handle);
            }
        }

        if let Err(e) = self.repo.set_record_assets(record_id, image, enclosures).await {
            if let Err(reclaim_err) = self.reaper.reclaim(&handles).await {
                tracing::warn!(record_id, "Failed to reclaim unattached files: {}", reclaim_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stores the image and enclosures locally. Failures are logged and leave
    /// the affected field unset.
    async fn localize(
        &self,
        source: &FeedSource,
        record_id: i64,
        image_url: Option<&str>,
        enclosure_urls: &[String],
    ) -> (Option<AssetHandle>, Vec<AssetHandle>) {
        let mut image = None;
        if let Some(url) = image_url {
            match self
                .localizer
                .store_local(url, &source.files_path, record_id)
                .await
            {
                Ok(asset) => image = Some(asset.handle),
                Err(e) => tracing::warn!(source_id = source.id, record_id, "Warning, {}", e),
            }
        }

        let mut enclosures = Vec::new();
        for url in enclosure_urls {
            if Some(url.as_str()) == image_url {
                enclosures.extend(image);
                continue;
            }
            match self
                .localizer
                .store_local(url, &source.files_path, record_id)
                .await
            {
                Ok(asset) => enclosures.push(asset.handle),
                Err(e) => tracing::warn!(source_id = source.id, record_id, "Warning, {}", e),
            }
        }

        (image, enclosures)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::DateTime;
    use tempfile::TempDir;

    use super::*;
    use crate::assets::testing::StaticDownloader;
    use crate::assets::{Download, HttpDownloader};
    use crate::config::{HttpConfig, StorageConfig};
    use crate::models::{BodySource, ContentBlock, NewFeedSource};

    struct TestSync {
        sync: Synchronizer,
        repo: Arc<Repository>,
        root: PathBuf,
        _tmpdir: TempDir,
    }

    async fn test_sync(downloader: Arc<dyn Download>) -> TestSync {
        let tmpdir = tempfile::tempdir().unwrap();
        let repo = Arc::new(Repository::new(tmpdir.path().join("test.db")).await.unwrap());
        let storage = StorageConfig {
            root: tmpdir.path().join("storage"),
            allowed_extensions: "jpg,png,mp3".to_string(),
            ..StorageConfig::default()
        };
        let sync = Synchronizer::new(
            repo.clone(),
            FeedFetcher::new(&HttpConfig::default()).unwrap(),
            Localizer::new(repo.clone(), downloader, &storage),
            Reaper::new(repo.clone(), storage.root.clone()),
            &SyncConfig::default(),
        );
        TestSync {
            sync,
            repo,
            root: storage.root,
            _tmpdir: tmpdir,
        }
    }

    async fn add_source(test: &TestSync, url: &str, body_source: BodySource) -> FeedSource {
        let mut new_source = NewFeedSource::with_defaults(1, "News", url, "files/news");
        new_source.body_source = body_source;
        let id = test.repo.insert_source(new_source).await.unwrap();
        test.repo.get_source(id).await.unwrap().unwrap()
    }

    fn item(guid: &str, title: &str, updated: i64) -> FeedItem {
        FeedItem {
            guid: guid.into(),
            title: title.into(),
            link: format!("https://example.com/{guid}"),
            published: DateTime::from_timestamp(50, 0),
            updated: DateTime::from_timestamp(updated, 0),
            description: Some(format!("<p>{title} teaser</p>")),
            content: Some(format!("<p>{title} body</p>")),
            ..FeedItem::default()
        }
    }

    async fn run(test: &TestSync, source: &FeedSource, items: Vec<FeedItem>) -> SyncReport {
        let mut report = SyncReport::new(source.id, &source.url);
        test.sync
            .sync_items(source, items, &mut report)
            .await
            .unwrap();
        report
    }

    #[tokio::test]
    async fn inserts_new_items_with_body_blocks() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Content).await;

        let report = run(&test, &source, vec![item("a", "First", 100), item("b", "Second", 100)]).await;

        assert_eq!((report.read, report.inserted, report.updated), (2, 2, 0));
        let records = test.repo.get_records_for_source(source.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].alias, "first");
        assert_eq!(records[0].teaser, "First teaser");

        let blocks = test.repo.get_blocks(records[0].id).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], ContentBlock::Text { text: "First body".into() });
        assert!(matches!(&blocks[1], ContentBlock::Hyperlink { link_title, .. } if link_title == "Read more"));
    }

    #[tokio::test]
    async fn colliding_headlines_do_not_stop_the_source() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Default).await;
        let items = vec![
            item("a", "Foo 3", 100),
            item("b", "Foo", 100),
            item("c", "Foo", 100),
            item("d", "Later", 100),
        ];

        let report = run(&test, &source, items).await;

        assert_eq!((report.read, report.inserted), (4, 4));
        let aliases: Vec<String> = test
            .repo
            .get_records_for_source(source.id)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.alias)
            .collect();
        assert_eq!(aliases, vec!["foo-3", "foo", "foo-3-2", "later"]);
    }

    #[tokio::test]
    async fn second_run_on_unchanged_feed_writes_nothing() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Default).await;
        let items = vec![item("a", "First", 100), item("b", "Second", 120)];

        run(&test, &source, items.clone()).await;
        let report = run(&test, &source, items).await;

        assert_eq!((report.read, report.inserted, report.updated), (2, 0, 0));
        assert_eq!(test.repo.get_records_for_source(source.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn older_duplicate_in_same_run_does_not_overwrite() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Default).await;

        let report = run(&test, &source, vec![item("abc", "Newer", 100), item("abc", "Older", 90)]).await;

        assert_eq!((report.read, report.inserted, report.updated), (2, 1, 0));
        let records = test.repo.get_records_for_source(source.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].headline, "Newer");
    }

    #[tokio::test]
    async fn newer_item_in_later_run_updates_in_place() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Content).await;

        run(&test, &source, vec![item("abc", "Original", 90)]).await;
        let before = test.repo.find_record(source.id, "abc").await.unwrap().unwrap();

        let report = run(&test, &source, vec![item("abc", "Revised", 100)]).await;

        assert_eq!((report.inserted, report.updated), (0, 1));
        let after = test.repo.find_record(source.id, "abc").await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.alias, before.alias);
        assert_eq!(after.headline, "Revised");
        let blocks = test.repo.get_blocks(after.id).await.unwrap();
        assert_eq!(blocks[0], ContentBlock::Text { text: "Revised body".into() });
        assert_eq!(blocks.len(), 2);
    }

    #[tokio::test]
    async fn image_and_matching_enclosure_share_one_asset() {
        let image = "https://cdn.example.com/photo.jpg";
        let audio = "https://cdn.example.com/episode.mp3";
        let downloader = Arc::new(
            StaticDownloader::default()
                .with_file(image, b"jpeg")
                .with_file(audio, b"mp3"),
        );
        let test = test_sync(downloader.clone()).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Default).await;
        let mut feed_item = item("a", "With media", 100);
        feed_item.image = Some(image.into());
        feed_item.enclosures = vec![
            image.into(),
            audio.into(),
            "https://cdn.example.com/setup.exe".into(),
        ];

        let report = run(&test, &source, vec![feed_item]).await;

        assert_eq!(report.inserted, 1);
        assert_eq!(downloader.calls(), 2);
        let record = test.repo.find_record(source.id, "a").await.unwrap().unwrap();
        let image_handle = record.image.unwrap();
        assert_eq!(record.enclosures.len(), 2);
        assert_eq!(record.enclosures[0], image_handle);
        let stored = test.repo.resolve_asset(image_handle).await.unwrap().unwrap();
        assert_eq!(stored.path, format!("files/news/photo_{}.jpg", record.id));
        assert!(test.root.join(&stored.path).exists());
    }

    #[tokio::test]
    async fn update_replaces_previous_attachments() {
        let first = "https://cdn.example.com/first.mp3";
        let second = "https://cdn.example.com/second.mp3";
        let downloader = Arc::new(
            StaticDownloader::default()
                .with_file(first, b"one")
                .with_file(second, b"two"),
        );
        let test = test_sync(downloader).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Default).await;

        let mut original = item("a", "Episode", 90);
        original.enclosures = vec![first.into()];
        run(&test, &source, vec![original]).await;
        let record = test.repo.find_record(source.id, "a").await.unwrap().unwrap();
        let old_path = test
            .repo
            .resolve_asset(record.enclosures[0])
            .await
            .unwrap()
            .unwrap()
            .path;

        let mut revised = item("a", "Episode", 100);
        revised.enclosures = vec![second.into()];
        let report = run(&test, &source, vec![revised]).await;

        assert_eq!(report.updated, 1);
        assert!(!test.root.join(&old_path).exists());
        assert!(test.repo.resolve_asset(record.enclosures[0]).await.unwrap().is_none());
        let record = test.repo.find_record(source.id, "a").await.unwrap().unwrap();
        assert_eq!(record.enclosures.len(), 1);
        let new_path = test
            .repo
            .resolve_asset(record.enclosures[0])
            .await
            .unwrap()
            .unwrap()
            .path;
        assert_eq!(std::fs::read(test.root.join(new_path)).unwrap(), b"two");
    }

    #[tokio::test]
    async fn assets_that_cannot_be_attached_are_reclaimed() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let path = "files/news/episode_999.mp3";
        std::fs::create_dir_all(test.root.join("files/news")).unwrap();
        std::fs::write(test.root.join(path), b"mp3").unwrap();
        let asset = test.repo.register_asset(path.to_string()).await.unwrap();

        // No record 999 exists, so the enclosure row cannot be written.
        let result = test.sync.attach_assets(999, None, vec![asset.handle]).await;

        assert!(result.is_err());
        assert!(!test.root.join(path).exists());
        assert!(test.repo.resolve_asset(asset.handle).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_localization_leaves_field_unset() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "https://example.com/rss", BodySource::Default).await;
        let mut feed_item = item("a", "Broken image", 100);
        feed_item.image = Some("https://cdn.example.com/missing.jpg".into());

        let report = run(&test, &source, vec![feed_item]).await;

        assert_eq!(report.inserted, 1);
        let record = test.repo.find_record(source.id, "a").await.unwrap().unwrap();
        assert!(record.image.is_none());
        assert_eq!(record.image_url.as_deref(), Some("https://cdn.example.com/missing.jpg"));
    }

    #[tokio::test]
    async fn empty_url_is_skipped() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;
        let source = add_source(&test, "", BodySource::Default).await;

        let report = test.sync.sync_source(&source).await;

        assert_eq!(
            report.status,
            SyncStatus::Skipped {
                reason: "empty URL".to_string()
            }
        );
        assert_eq!(report.read, 0);
        assert!(test.repo.get_records_for_source(source.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_source_id_is_skipped() {
        let test = test_sync(Arc::new(StaticDownloader::default())).await;

        let report = test.sync.sync_source_by_id(404).await;

        assert!(matches!(report.status, SyncStatus::Skipped { .. }));
    }

    #[tokio::test]
    async fn sync_all_reports_every_source() {
        let mut server = mockito::Server::new_async().await;
        let feed = format!(
            r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Feed</title>
    <link>{base}</link>
    <description>Feed</description>
    <item>
      <title>Pictured</title>
      <link>{base}/pictured</link>
      <guid>pictured</guid>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <description>Teaser</description>
      <enclosure url="{base}/media/picture.png" length="3" type="image/png"/>
    </item>
  </channel>
</rss>"#,
            base = server.url()
        );
        let _feed_mock = server
            .mock("GET", "/feed.xml")
            .with_status(200)
            .with_body(feed)
            .create_async()
            .await;
        let _broken_mock = server
            .mock("GET", "/broken.xml")
            .with_status(500)
            .create_async()
            .await;
        let _image_mock = server
            .mock("GET", "/media/picture.png")
            .with_status(200)
            .with_body([137u8, 80, 78])
            .create_async()
            .await;

        let downloader = Arc::new(HttpDownloader::new(&HttpConfig::default()).unwrap());
        let test = test_sync(downloader).await;
        let good = add_source(&test, &format!("{}/feed.xml", server.url()), BodySource::Default).await;
        let empty = add_source(&test, "", BodySource::Default).await;
        let broken = add_source(&test, &format!("{}/broken.xml", server.url()), BodySource::Default).await;

        let reports = test.sync.sync_all().await.unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].source_id, good.id);
        assert_eq!(reports[0].status, SyncStatus::Completed);
        assert_eq!((reports[0].read, reports[0].inserted), (1, 1));
        assert!(matches!(reports[1].status, SyncStatus::Skipped { .. }));
        assert_eq!(reports[1].source_id, empty.id);
        assert!(matches!(reports[2].status, SyncStatus::Failed { .. }));
        assert_eq!(reports[2].source_id, broken.id);

        let record = test.repo.find_record(good.id, "pictured").await.unwrap().unwrap();
        assert!(record.image.is_some());
        assert_eq!(record.enclosures, vec![record.image.unwrap()]);
        let synced = test.repo.get_source(good.id).await.unwrap().unwrap();
        assert!(synced.last_synced_at.is_some());
    }
}
