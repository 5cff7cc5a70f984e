//! File content access for the pipeline

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Reads the current content of a file
///
/// `None` means the file is missing, unreadable, not UTF-8 or empty, and
/// the caller should skip it.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> Option<String>;
}

/// Reads straight from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

#[async_trait]
impl FileReader for FsReader {
    async fn read(&self, path: &Path) -> Option<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.is_empty() => {
                debug!("{} is empty", path.display());
                None
            }
            Ok(content) => Some(content),
            Err(e) => {
                debug!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }
}
