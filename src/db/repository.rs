use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    AssetHandle, BodySource, ContentBlock, ContentRecord, FeedSource, ImageSettings, LocalAsset,
    NewContentRecord, NewFeedSource, SubtitleSource,
};
use crate::text::slugify;

use super::schema::SCHEMA;

const SOURCE_COLUMNS: &str = "id, archive_id, title, url, enabled, subtitle_source, teaser_html, \
    allowed_tags, truncate, author, target, published, image_margin, image_size, image_fullsize, \
    image_floating, css_class, body_source, files_path, last_synced_at";

const RECORD_COLUMNS: &str = "id, source_id, guid, headline, alias, author, date, tstamp, \
    subheadline, teaser, image_asset, image_url, image_margin, image_size, image_fullsize, \
    image_floating, body_source, url, link, target, published, css_class";

/// Record store and asset registry backed by SQLite.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            // Several sources may be written at once
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Source operations

    pub async fn insert_source(&self, source: NewFeedSource) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO sources (archive_id, title, url, subtitle_source, teaser_html,
                           allowed_tags, truncate, author, target, published, image_margin,
                           image_size, image_fullsize, image_floating, css_class, body_source,
                           files_path)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"#,
                    params![
                        source.archive_id,
                        source.title,
                        source.url,
                        source.subtitle_source.as_str(),
                        source.teaser_html,
                        source.allowed_tags,
                        source.truncate as i64,
                        source.author,
                        source.target,
                        source.published,
                        source.image.margin,
                        source.image.size,
                        source.image.fullsize,
                        source.image.floating,
                        source.css_class,
                        source.body_source.as_str(),
                        source.files_path,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<FeedSource>> {
        let source = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1");
                let source = conn
                    .query_row(&sql, params![id], source_from_row)
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    pub async fn get_enabled_sources(&self) -> Result<Vec<FeedSource>> {
        let sources = self
            .conn
            .call(|conn| {
                let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled = 1 ORDER BY id");
                let mut stmt = conn.prepare(&sql)?;
                let sources = stmt
                    .query_map([], source_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    pub async fn set_source_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE sources SET enabled = ?1 WHERE id = ?2",
                    params![enabled, id],
                )?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(anyhow::anyhow!("No source with id {}", id).into());
        }
        Ok(())
    }

    pub async fn update_source_last_synced(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE sources SET last_synced_at = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Record operations

    pub async fn find_record(&self, source_id: i64, guid: &str) -> Result<Option<ContentRecord>> {
        let guid = guid.to_string();
        let record = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE source_id = ?1 AND guid = ?2");
                Ok(query_records(conn, &sql, params![source_id, guid])?.pop())
            })
            .await?;
        Ok(record)
    }

    pub async fn get_record(&self, id: i64) -> Result<Option<ContentRecord>> {
        let record = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1");
                Ok(query_records(conn, &sql, params![id])?.pop())
            })
            .await?;
        Ok(record)
    }

    pub async fn get_records_for_source(&self, source_id: i64) -> Result<Vec<ContentRecord>> {
        let records = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE source_id = ?1 ORDER BY id");
                Ok(query_records(conn, &sql, params![source_id])?)
            })
            .await?;
        Ok(records)
    }

    pub async fn get_blocks(&self, record_id: i64) -> Result<Vec<ContentBlock>> {
        let blocks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT kind, text, title_text, url, link_title, target
                       FROM content_blocks WHERE record_id = ?1 ORDER BY sorting, id"#,
                )?;
                let blocks = stmt
                    .query_map(params![record_id], block_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(blocks.into_iter().flatten().collect())
            })
            .await?;
        Ok(blocks)
    }

    /// Inserts a record with its body blocks and returns the new id and alias.
    ///
    /// The alias is the slugified headline, or the id for headlines without
    /// letters or digits. When another record of the same source already uses
    /// it, `-{id}` is appended, then a counter until the alias is free.
    pub async fn insert_record(
        &self,
        record: NewContentRecord,
        blocks: Vec<ContentBlock>,
    ) -> Result<(i64, String)> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO records (source_id, guid, headline, alias, author, date, tstamp,
                           subheadline, teaser, image_url, image_margin, image_size, image_fullsize,
                           image_floating, body_source, url, link, target, published, css_class)
                       VALUES (?1, ?2, ?3, '', ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"#,
                    params![
                        record.source_id,
                        record.guid,
                        record.headline,
                        record.author,
                        record.date.timestamp(),
                        record.tstamp.timestamp(),
                        record.subheadline,
                        record.teaser,
                        record.image_url,
                        record.image_settings.margin,
                        record.image_settings.size,
                        record.image_settings.fullsize,
                        record.image_settings.floating,
                        record.body_source.as_str(),
                        record.url,
                        record.link,
                        record.target,
                        record.published,
                        record.css_class,
                    ],
                )?;
                let id = tx.last_insert_rowid();

                let alias = allocate_alias(&tx, record.source_id, id, &record.headline)?;
                tx.execute("UPDATE records SET alias = ?1 WHERE id = ?2", params![alias, id])?;

                insert_blocks(&tx, id, record.tstamp, &blocks)?;
                tx.commit()?;
                Ok((id, alias))
            })
            .await?;
        Ok(inserted)
    }

    /// Overwrites a record's feed-derived fields and replaces its body blocks.
    /// Alias and asset references are left untouched.
    pub async fn update_record(
        &self,
        id: i64,
        record: NewContentRecord,
        blocks: Vec<ContentBlock>,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"UPDATE records SET headline = ?1, author = ?2, date = ?3, tstamp = ?4,
                           subheadline = ?5, teaser = ?6, image_url = ?7, image_margin = ?8,
                           image_size = ?9, image_fullsize = ?10, image_floating = ?11,
                           body_source = ?12, url = ?13, link = ?14, target = ?15, published = ?16,
                           css_class = ?17
                       WHERE id = ?18"#,
                    params![
                        record.headline,
                        record.author,
                        record.date.timestamp(),
                        record.tstamp.timestamp(),
                        record.subheadline,
                        record.teaser,
                        record.image_url,
                        record.image_settings.margin,
                        record.image_settings.size,
                        record.image_settings.fullsize,
                        record.image_settings.floating,
                        record.body_source.as_str(),
                        record.url,
                        record.link,
                        record.target,
                        record.published,
                        record.css_class,
                        id,
                    ],
                )?;
                tx.execute("DELETE FROM content_blocks WHERE record_id = ?1", params![id])?;
                insert_blocks(&tx, id, record.tstamp, &blocks)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_record_assets(
        &self,
        id: i64,
        image: Option<AssetHandle>,
        enclosures: Vec<AssetHandle>,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE records SET image_asset = ?1 WHERE id = ?2",
                    params![image.map(|h| h.to_string()), id],
                )?;
                tx.execute("DELETE FROM record_enclosures WHERE record_id = ?1", params![id])?;
                for (position, handle) in enclosures.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO record_enclosures (record_id, position, asset_uuid) VALUES (?1, ?2, ?3)",
                        params![id, position as i64, handle.to_string()],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Deletes a record with its blocks and returns the asset handles it referenced.
    pub async fn delete_record(&self, id: i64) -> Result<Vec<AssetHandle>> {
        let handles = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1");
                let records = query_records(&tx, &sql, params![id])?;
                delete_record_rows(&tx, "id = ?1", id)?;
                tx.commit()?;
                Ok(collect_handles(&records))
            })
            .await?;
        Ok(handles)
    }

    /// Deletes every record of a source and returns the asset handles they referenced.
    pub async fn delete_records_for_source(&self, source_id: i64) -> Result<Vec<AssetHandle>> {
        let handles = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE source_id = ?1");
                let records = query_records(&tx, &sql, params![source_id])?;
                delete_record_rows(&tx, "source_id = ?1", source_id)?;
                tx.commit()?;
                Ok(collect_handles(&records))
            })
            .await?;
        Ok(handles)
    }

    // Asset registry

    pub async fn register_asset(&self, path: String) -> Result<LocalAsset> {
        let handle = AssetHandle::generate();
        let asset = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO assets (uuid, path) VALUES (?1, ?2)",
                    params![handle.to_string(), path],
                )?;
                Ok(LocalAsset { handle, path })
            })
            .await?;
        Ok(asset)
    }

    pub async fn resolve_asset(&self, handle: AssetHandle) -> Result<Option<LocalAsset>> {
        let asset = self
            .conn
            .call(move |conn| {
                let path: Option<String> = conn
                    .query_row(
                        "SELECT path FROM assets WHERE uuid = ?1",
                        params![handle.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(path.map(|path| LocalAsset { handle, path }))
            })
            .await?;
        Ok(asset)
    }

    pub async fn delete_asset(&self, handle: AssetHandle) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM assets WHERE uuid = ?1", params![handle.to_string()])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Number of image and enclosure references to `handle` across all records.
    pub async fn count_asset_references(&self, handle: AssetHandle) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    r#"SELECT (SELECT COUNT(*) FROM records WHERE image_asset = ?1)
                            + (SELECT COUNT(*) FROM record_enclosures WHERE asset_uuid = ?1)"#,
                    params![handle.to_string()],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

fn insert_blocks(
    conn: &SqliteConnection,
    record_id: i64,
    tstamp: DateTime<Utc>,
    blocks: &[ContentBlock],
) -> rusqlite::Result<()> {
    for block in blocks {
        match block {
            ContentBlock::Text { text } => conn.execute(
                r#"INSERT INTO content_blocks (record_id, kind, sorting, tstamp, text)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![record_id, block.kind(), block.sorting(), tstamp.timestamp(), text],
            )?,
            ContentBlock::Hyperlink {
                title_text,
                url,
                link_title,
                target,
            } => conn.execute(
                r#"INSERT INTO content_blocks (record_id, kind, sorting, tstamp, title_text, url, link_title, target)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    record_id,
                    block.kind(),
                    block.sorting(),
                    tstamp.timestamp(),
                    title_text,
                    url,
                    link_title,
                    target
                ],
            )?,
        };
    }
    Ok(())
}

fn allocate_alias(
    conn: &SqliteConnection,
    source_id: i64,
    id: i64,
    headline: &str,
) -> rusqlite::Result<String> {
    let slug = slugify(headline);
    let base = if slug.is_empty() { id.to_string() } else { slug };

    let mut alias = base.clone();
    let mut attempt = 1;
    while alias_taken(conn, source_id, id, &alias)? {
        alias = if attempt == 1 {
            format!("{base}-{id}")
        } else {
            format!("{base}-{id}-{attempt}")
        };
        attempt += 1;
    }
    Ok(alias)
}

fn alias_taken(conn: &SqliteConnection, source_id: i64, id: i64, alias: &str) -> rusqlite::Result<bool> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM records WHERE source_id = ?1 AND alias = ?2 AND id != ?3",
            params![source_id, alias, id],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    Ok(taken)
}

fn delete_record_rows(conn: &SqliteConnection, filter: &str, value: i64) -> rusqlite::Result<()> {
    let ids = format!("SELECT id FROM records WHERE {filter}");
    conn.execute(
        &format!("DELETE FROM content_blocks WHERE record_id IN ({ids})"),
        params![value],
    )?;
    conn.execute(
        &format!("DELETE FROM record_enclosures WHERE record_id IN ({ids})"),
        params![value],
    )?;
    conn.execute(&format!("DELETE FROM records WHERE {filter}"), params![value])?;
    Ok(())
}

fn collect_handles(records: &[ContentRecord]) -> Vec<AssetHandle> {
    let mut handles = Vec::new();
    for handle in records.iter().flat_map(|record| record.asset_handles()) {
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    handles
}

fn query_records(
    conn: &SqliteConnection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<ContentRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut records = stmt
        .query_map(params, record_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut enclosure_stmt = conn.prepare(
        "SELECT asset_uuid FROM record_enclosures WHERE record_id = ?1 ORDER BY position",
    )?;
    for record in &mut records {
        record.enclosures = enclosure_stmt
            .query_map(params![record.id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .iter()
            .filter_map(|uuid| uuid.parse().ok())
            .collect();
    }

    Ok(records)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn source_from_row(row: &Row) -> rusqlite::Result<FeedSource> {
    Ok(FeedSource {
        id: row.get(0)?,
        archive_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        enabled: row.get(4)?,
        subtitle_source: SubtitleSource::parse(&row.get::<_, String>(5)?),
        teaser_html: row.get(6)?,
        allowed_tags: row.get(7)?,
        truncate: row.get::<_, i64>(8)?.max(0) as usize,
        author: row.get(9)?,
        target: row.get(10)?,
        published: row.get(11)?,
        image: ImageSettings {
            margin: row.get(12)?,
            size: row.get(13)?,
            fullsize: row.get(14)?,
            floating: row.get(15)?,
        },
        css_class: row.get(16)?,
        body_source: BodySource::parse(&row.get::<_, String>(17)?),
        files_path: row.get(18)?,
        last_synced_at: row
            .get::<_, Option<String>>(19)?
            .and_then(|s| parse_datetime(&s)),
    })
}

fn record_from_row(row: &Row) -> rusqlite::Result<ContentRecord> {
    Ok(ContentRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        guid: row.get(2)?,
        headline: row.get(3)?,
        alias: row.get(4)?,
        author: row.get(5)?,
        date: from_unix(row.get(6)?),
        tstamp: from_unix(row.get(7)?),
        subheadline: row.get(8)?,
        teaser: row.get(9)?,
        image: row
            .get::<_, Option<String>>(10)?
            .and_then(|uuid| uuid.parse().ok()),
        image_url: row.get(11)?,
        image_settings: ImageSettings {
            margin: row.get(12)?,
            size: row.get(13)?,
            fullsize: row.get(14)?,
            floating: row.get(15)?,
        },
        enclosures: Vec::new(),
        body_source: BodySource::parse(&row.get::<_, String>(16)?),
        url: row.get(17)?,
        link: row.get(18)?,
        target: row.get(19)?,
        published: row.get(20)?,
        css_class: row.get(21)?,
    })
}

fn block_from_row(row: &Row) -> rusqlite::Result<Option<ContentBlock>> {
    let kind: String = row.get(0)?;
    let block = match kind.as_str() {
        "text" => Some(ContentBlock::Text {
            text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        }),
        "hyperlink" => Some(ContentBlock::Hyperlink {
            title_text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            link_title: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            target: row.get(5)?,
        }),
        _ => None,
    };
    Ok(block)
}
