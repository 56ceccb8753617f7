pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    archive_id INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    subtitle_source TEXT NOT NULL DEFAULT '',
    teaser_html INTEGER NOT NULL DEFAULT 0,
    allowed_tags TEXT NOT NULL DEFAULT '',
    truncate INTEGER NOT NULL DEFAULT 0,
    author TEXT NOT NULL DEFAULT '',
    target INTEGER NOT NULL DEFAULT 0,
    published INTEGER NOT NULL DEFAULT 1,
    image_margin TEXT NOT NULL DEFAULT '',
    image_size TEXT NOT NULL DEFAULT '',
    image_fullsize INTEGER NOT NULL DEFAULT 0,
    image_floating TEXT NOT NULL DEFAULT '',
    css_class TEXT NOT NULL DEFAULT '',
    body_source TEXT NOT NULL DEFAULT 'default',
    files_path TEXT NOT NULL DEFAULT '',
    last_synced_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    guid TEXT NOT NULL,
    headline TEXT NOT NULL DEFAULT '',
    alias TEXT NOT NULL,
    author TEXT NOT NULL DEFAULT '',
    date INTEGER NOT NULL DEFAULT 0,
    tstamp INTEGER NOT NULL DEFAULT 0,
    subheadline TEXT NOT NULL DEFAULT '',
    teaser TEXT NOT NULL DEFAULT '',
    image_asset TEXT REFERENCES assets(uuid),
    image_url TEXT,
    image_margin TEXT NOT NULL DEFAULT '',
    image_size TEXT NOT NULL DEFAULT '',
    image_fullsize INTEGER NOT NULL DEFAULT 0,
    image_floating TEXT NOT NULL DEFAULT '',
    body_source TEXT NOT NULL DEFAULT 'default',
    url TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL DEFAULT '',
    target INTEGER NOT NULL DEFAULT 0,
    published INTEGER NOT NULL DEFAULT 0,
    css_class TEXT NOT NULL DEFAULT '',
    UNIQUE(source_id, guid),
    UNIQUE(source_id, alias)
);

CREATE TABLE IF NOT EXISTS record_enclosures (
    record_id INTEGER NOT NULL REFERENCES records(id),
    position INTEGER NOT NULL,
    asset_uuid TEXT NOT NULL REFERENCES assets(uuid),
    PRIMARY KEY (record_id, position)
);

CREATE TABLE IF NOT EXISTS content_blocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(id),
    kind TEXT NOT NULL,
    sorting INTEGER NOT NULL,
    tstamp INTEGER NOT NULL DEFAULT 0,
    text TEXT,
    title_text TEXT,
    url TEXT,
    link_title TEXT,
    target INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS assets (
    uuid TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_records_image_asset ON records(image_asset);
CREATE INDEX IF NOT EXISTS idx_record_enclosures_asset ON record_enclosures(asset_uuid);
CREATE INDEX IF NOT EXISTS idx_content_blocks_record ON content_blocks(record_id);
"#;
