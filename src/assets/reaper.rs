use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::db::Repository;
use crate::error::Result;
use crate::models::AssetHandle;

/// Outcome of deleting records and reclaiming the files they left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    /// Relative paths of files removed together with their registry entries.
    pub removed: Vec<String>,
    /// Handles still referenced by another record.
    pub kept: usize,
}

/// Removes localized files once no record refers to them anymore.
pub struct Reaper {
    repo: Arc<Repository>,
    root: PathBuf,
}

impl Reaper {
    pub fn new(repo: Arc<Repository>, root: PathBuf) -> Self {
        Self { repo, root }
    }

    pub async fn delete_record(&self, record_id: i64) -> Result<ReapReport> {
        let handles = self.repo.delete_record(record_id).await?;
        self.reclaim(&handles).await
    }

    pub async fn delete_source_records(&self, source_id: i64) -> Result<ReapReport> {
        let handles = self.repo.delete_records_for_source(source_id).await?;
        self.reclaim(&handles).await
    }

    /// Deletes each handle's file and registry entry unless a record still
    /// references it. A file that is already gone only loses its registry entry.
    pub async fn reclaim(&self, handles: &[AssetHandle]) -> Result<ReapReport> {
        let mut report = ReapReport::default();

        for &handle in handles {
            if self.repo.count_asset_references(handle).await? > 0 {
                report.kept += 1;
                continue;
            }

            let Some(asset) = self.repo.resolve_asset(handle).await? else {
                tracing::debug!(%handle, "asset already unregistered");
                continue;
            };

            let path = self.root.join(&asset.path);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(path = %asset.path, "file already removed from disk");
                }
                Err(e) => {
                    tracing::warn!(path = %asset.path, "Failed to remove orphaned file: {}", e);
                    continue;
                }
            }

            self.repo.delete_asset(handle).await?;
            tracing::info!(path = %asset.path, "removed orphaned attachment");
            report.removed.push(asset.path);
        }

        Ok(report)
    }
}
