use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const CONFIG_ENV: &str = "RSS_IMPORT_CONFIG";
const APP_DIR: &str = "rss-import";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rss-import.db");
        Self { path }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that relative asset paths are resolved against.
    pub root: PathBuf,
    /// Comma separated list of file extensions that may be stored locally.
    pub allowed_extensions: String,
    /// Base path given to sources registered from an OPML file.
    pub default_files_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            allowed_extensions: "jpg,jpeg,gif,png,webp,svg,pdf,mp3,mp4,m4a,ogg,zip".to_string(),
            default_files_path: "files/rss-import".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_extensions
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("rss-import/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub concurrency: usize,
    pub read_more_label: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            read_more_label: "Read more".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
}

impl Config {
    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            root = "/srv/cms"
            allowed_extensions = "JPG, .png ,,pdf"

            [sync]
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/srv/cms"));
        assert_eq!(config.storage.allowed_extensions(), vec!["jpg", "png", "pdf"]);
        assert_eq!(config.storage.default_files_path, "files/rss-import");
        assert_eq!(config.sync.concurrency, 2);
        assert_eq!(config.sync.read_more_label, "Read more");
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.log.file.is_none());
    }

    #[test]
    fn reads_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\ntimeout_secs = 5\n[log]\nfile = \"/tmp/import.log\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/import.log")));
    }
}
