//! Persistence of the last forwarded cursor.
//!
//! The relay saves its cursor after every batch so that a restart resumes
//! where the previous process stopped instead of at the configured start.

use super::{Cursor, LogError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[async_trait]
pub trait CursorCheckpoint: Send + Sync {
    async fn load(&self) -> Result<Option<Cursor>, LogError>;
    async fn save(&self, cursor: &Cursor) -> Result<(), LogError>;
}

/// Checkpoint that lives as long as the process.
#[derive(Default)]
pub struct MemoryCheckpoint {
    cursor: RwLock<Option<Cursor>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorCheckpoint for MemoryCheckpoint {
    async fn load(&self) -> Result<Option<Cursor>, LogError> {
        Ok(self.cursor.read().await.clone())
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), LogError> {
        *self.cursor.write().await = Some(cursor.clone());
        Ok(())
    }
}

/// Checkpoint stored as a single-line text file.
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CursorCheckpoint for FileCheckpoint {
    async fn load(&self) -> Result<Option<Cursor>, LogError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let content = content.trim();
                Ok((!content.is_empty()).then(|| Cursor::new(content)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, cursor: &Cursor) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write atomically: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, format!("{cursor}\n")).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
