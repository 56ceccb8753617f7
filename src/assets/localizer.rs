use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use url::Url;

use crate::config::StorageConfig;
use crate::db::Repository;
use crate::error::LocalizationError;
use crate::models::LocalAsset;
use crate::text::slugify;

use super::Download;

/// Mirrors remote files into local storage, one write-once file per call.
pub struct Localizer {
    repo: Arc<Repository>,
    downloader: Arc<dyn Download>,
    root: PathBuf,
    allowed_extensions: Vec<String>,
}

impl Localizer {
    pub fn new(repo: Arc<Repository>, downloader: Arc<dyn Download>, storage: &StorageConfig) -> Self {
        Self {
            repo,
            downloader,
            root: storage.root.clone(),
            allowed_extensions: storage.allowed_extensions(),
        }
    }

    /// Downloads `remote_url` to `{base_path}/{name}_{owner_id}.{ext}` and
    /// registers it. Either a file and its registry entry both exist
    /// afterwards, or neither does.
    pub async fn store_local(
        &self,
        remote_url: &str,
        base_path: &str,
        owner_id: i64,
    ) -> Result<LocalAsset, LocalizationError> {
        let remote_url = remote_url.trim();
        let base_path = base_path.trim().trim_end_matches('/');
        let mut reasons = Vec::new();

        if remote_url.is_empty() {
            reasons.push("empty URL not allowed".to_string());
        }
        if base_path.chars().count() < 2 {
            reasons.push("empty base path for downloads not allowed".to_string());
        }

        let (stem, extension) = remote_file_parts(remote_url);
        if !self.allowed_extensions.contains(&extension) {
            reasons.push(format!("suffix '{extension}' not supported"));
        }

        let relative_path = format!("{base_path}/{stem}_{owner_id}.{extension}");
        let destination = self.root.join(&relative_path);
        if destination.exists() {
            reasons.push("output file already exists".to_string());
        }

        if !reasons.is_empty() {
            return Err(LocalizationError {
                url: remote_url.to_string(),
                reasons,
            });
        }

        let data = self
            .downloader
            .download(remote_url)
            .await
            .map_err(|e| LocalizationError::new(remote_url, format!("could not read from URL ({e})")))?;
        if data.is_empty() {
            return Err(LocalizationError::new(remote_url, "no file data"));
        }

        let target = destination.clone();
        tokio::task::spawn_blocking(move || write_new_file(&target, &data))
            .await
            .map_err(|e| LocalizationError::new(remote_url, format!("could not write file ({e})")))?
            .map_err(|e| {
                let reason = if e.kind() == io::ErrorKind::AlreadyExists {
                    "output file already exists".to_string()
                } else {
                    format!("could not write file ({e})")
                };
                LocalizationError::new(remote_url, reason)
            })?;

        match self.repo.register_asset(relative_path).await {
            Ok(asset) => {
                tracing::debug!(url = remote_url, path = %asset.path, "stored local copy");
                Ok(asset)
            }
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&destination) {
                    tracing::warn!("Failed to remove unregistered file {:?}: {}", destination, remove_err);
                }
                Err(LocalizationError::new(remote_url, format!("could not register file ({e})")))
            }
        }
    }
}

/// Slugified file stem and lowercased extension of the percent-decoded last
/// URL path segment. Query strings and fragments are ignored.
fn remote_file_parts(remote_url: &str) -> (String, String) {
    let file_name = Url::parse(remote_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|segment| {
            urlencoding::decode(&segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.clone())
        })
        .unwrap_or_else(|| {
            let path = remote_url.split(['?', '#']).next().unwrap_or_default();
            path.rsplit('/').next().unwrap_or_default().to_string()
        });

    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, extension)) => (stem, extension.to_lowercase()),
        None => (file_name.as_str(), String::new()),
    };

    let stem = slugify(stem);
    let stem = if stem.is_empty() { "file".to_string() } else { stem };
    (stem, extension)
}

/// Writes through a temporary file in the destination directory and links it
/// into place without replacing an existing file.
fn write_new_file(destination: &Path, data: &[u8]) -> io::Result<()> {
    let dir = destination
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist_noclobber(destination).map_err(|e| e.error)?;
    Ok(())
}
