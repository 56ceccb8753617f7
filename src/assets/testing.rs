use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::Download;
use crate::error::{AppError, Result};

/// Serves canned bodies and counts requests.
#[derive(Default)]
pub struct StaticDownloader {
    files: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl StaticDownloader {
    pub fn with_file(mut self, url: &str, body: &[u8]) -> Self {
        self.files.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Download for StaticDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files.get(url).cloned().ok_or_else(|| AppError::Fetch {
            url: url.to_string(),
            reason: "HTTP 404 Not Found".to_string(),
        })
    }
}
