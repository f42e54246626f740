//! Durable event log: one JSON-lines file per topic.
//!
//! ```text
//! <dir>/<topic>.log
//! {"cursor":"1700000000000-0","fields":{"id":"...","price":"9.99","v":"1"}}
//! ```
//!
//! Every record is also kept in a [`MemoryLogStore`] index that serves reads
//! and long-polls. Appends hit the file first and only become visible once
//! the line has been flushed.

use super::{
    Cursor, FieldMap, LogError, LogRecord, LogStore, MemoryLogStore, StreamId, validate_topic,
};
use crate::utils::shutdown::ShutdownReceiver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const LOG_EXTENSION: &str = "log";

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    cursor: Cursor,
    fields: FieldMap,
}

/// Append handle for one topic file.
struct TopicWriter {
    file: File,
    /// File length covering only complete, indexed lines.
    committed: u64,
}

/// File-backed event log.
pub struct FileLogStore {
    dir: PathBuf,
    index: MemoryLogStore,
    /// Open append handles per topic. Held across id assignment and write so
    /// that file order matches cursor order.
    writers: Mutex<HashMap<String, TopicWriter>>,
}

impl FileLogStore {
    /// Open or create a log directory, loading every existing topic file.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let index = MemoryLogStore::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(topic) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_topic(topic).is_err() {
                warn!(path = %path.display(), "Skipping log file with invalid topic name");
                continue;
            }
            let loaded = load_topic(&index, topic, &path).await?;
            info!(topic, records = loaded, "Loaded event log topic");
        }

        Ok(Self {
            dir,
            index,
            writers: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn topic_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}.{LOG_EXTENSION}"))
    }

    /// Cut a failed append back off the file.
    ///
    /// The handle that failed is dropped by the caller, so the next append
    /// reopens the file even if truncation fails too.
    async fn roll_back(&self, topic: &str, committed: u64) {
        let path = self.topic_path(topic);
        let result = async {
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(committed).await?;
            file.sync_all().await
        }
        .await;
        match result {
            Ok(()) => warn!(topic, committed, "Rolled back failed log append"),
            Err(e) => error!(topic, error = %e, "Failed to roll back log append"),
        }
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

async fn load_topic(index: &MemoryLogStore, topic: &str, path: &Path) -> Result<usize, LogError> {
    let content = tokio::fs::read_to_string(path).await?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut loaded = 0;

    for (n, line) in lines.iter().enumerate() {
        let entry: FileEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            // A crash mid-append can leave a torn final line.
            Err(e) if n + 1 == lines.len() && !content.ends_with('\n') => {
                warn!(topic, error = %e, "Dropping torn trailing log entry");
                let intact = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
                tokio::fs::write(path, &content[..intact]).await?;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        let id = StreamId::parse(&entry.cursor)
            .ok_or_else(|| LogError::InvalidCursor(entry.cursor.clone()))?;
        index
            .append_with(topic, entry.fields, |last| if id > last { id } else { last.successor(0) })
            .await?;
        loaded += 1;
    }

    Ok(loaded)
}

#[async_trait]
impl LogStore for FileLogStore {
    #[tracing::instrument(skip_all, err, fields(topic = topic))]
    async fn append(&self, topic: &str, fields: FieldMap) -> Result<Cursor, LogError> {
        validate_topic(topic)?;

        let mut writers = self.writers.lock().await;
        if !writers.contains_key(topic) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.topic_path(topic))
                .await?;
            let committed = file.metadata().await?.len();
            writers.insert(topic.to_string(), TopicWriter { file, committed });
        }
        let Some(writer) = writers.get_mut(topic) else {
            return Err(LogError::Closed);
        };

        let id = self.index.next_id(topic).await;
        let entry = FileEntry {
            cursor: id.to_cursor(),
            fields,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        if let Err(e) = write_line(&mut writer.file, &line).await {
            // A partial line would corrupt every later one.
            let committed = writer.committed;
            writers.remove(topic);
            self.roll_back(topic, committed).await;
            return Err(e.into());
        }
        writer.committed += line.len() as u64;

        let cursor = self
            .index
            .append_with(topic, entry.fields, |_| id)
            .await?;
        debug!(%cursor, "Appended record to file log");
        Ok(cursor)
    }

    async fn read_after(
        &self,
        topic: &str,
        after: &Cursor,
        limit: usize,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<Vec<LogRecord>, LogError> {
        self.index.read_after(topic, after, limit, shutdown).await
    }

    async fn scan(
        &self,
        topic: &str,
        after: &Cursor,
        limit: usize,
    ) -> Result<Vec<LogRecord>, LogError> {
        self.index.scan(topic, after, limit).await
    }

    async fn tail(&self, topic: &str) -> Result<Cursor, LogError> {
        self.index.tail(topic).await
    }
}
