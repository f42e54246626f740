use super::{
    Cursor, FieldMap, LogError, LogRecord, LogStore, StreamId, now_millis, validate_topic,
};
use crate::utils::shutdown::{ShutdownReceiver, wait_for_shutdown};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, watch};
use tracing::debug;

#[derive(Debug)]
struct StoredRecord {
    id: StreamId,
    fields: FieldMap,
}

impl StoredRecord {
    fn to_record(&self) -> LogRecord {
        LogRecord {
            cursor: self.id.to_cursor(),
            fields: self.fields.clone(),
        }
    }
}

struct Topic {
    records: RwLock<Vec<StoredRecord>>,
    /// Record count, bumped after every append to wake long-polling readers.
    tail_tx: watch::Sender<usize>,
}

impl Topic {
    fn new() -> Self {
        let (tail_tx, _) = watch::channel(0);
        Self {
            records: RwLock::new(Vec::new()),
            tail_tx,
        }
    }

    async fn collect_after(&self, after: StreamId, limit: usize) -> Vec<LogRecord> {
        let records = self.records.read().await;
        let start = records.partition_point(|r| r.id <= after);
        records[start..]
            .iter()
            .take(limit.max(1))
            .map(StoredRecord::to_record)
            .collect()
    }
}

/// Process-local event log.
///
/// Cursors are `<unix-millis>-<sequence>` and strictly increase per topic.
/// Also serves as the read index behind [`FileLogStore`](super::FileLogStore).
pub struct MemoryLogStore {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            topics: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            closed_tx,
        }
    }

    /// Refuse further operations and wake every pending reader.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
    }

    /// Number of records in `topic`.
    pub async fn len(&self, topic: &str) -> usize {
        match self.topics.read().await.get(topic) {
            Some(topic) => topic.records.read().await.len(),
            None => 0,
        }
    }

    fn ensure_open(&self) -> Result<(), LogError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(LogError::Closed)
        } else {
            Ok(())
        }
    }

    async fn topic(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.topics.read().await.get(name) {
            return Arc::clone(topic);
        }
        let mut topics = self.topics.write().await;
        Arc::clone(
            topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Topic::new())),
        )
    }

    /// Append with an id chosen by `assign`, which sees the current last id.
    ///
    /// The topic stays locked while `assign` runs, so ids come out in order.
    pub(crate) async fn append_with(
        &self,
        topic: &str,
        fields: FieldMap,
        assign: impl FnOnce(StreamId) -> StreamId,
    ) -> Result<Cursor, LogError> {
        validate_topic(topic)?;
        self.ensure_open()?;

        let topic = self.topic(topic).await;
        let mut records = topic.records.write().await;
        let last = records.last().map(|r| r.id).unwrap_or(StreamId::ZERO);
        let id = assign(last);
        records.push(StoredRecord { id, fields });
        let len = records.len();
        drop(records);

        topic.tail_tx.send_replace(len);
        Ok(id.to_cursor())
    }

    /// The id the next append to `topic` would receive right now.
    pub(crate) async fn next_id(&self, topic: &str) -> StreamId {
        let topic = self.topic(topic).await;
        let records = topic.records.read().await;
        records
            .last()
            .map(|r| r.id)
            .unwrap_or(StreamId::ZERO)
            .successor(now_millis())
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cursor(cursor: &Cursor) -> Result<StreamId, LogError> {
    StreamId::parse(cursor).ok_or_else(|| LogError::InvalidCursor(cursor.clone()))
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, topic: &str, fields: FieldMap) -> Result<Cursor, LogError> {
        let cursor = self
            .append_with(topic, fields, |last| last.successor(now_millis()))
            .await?;
        debug!(topic, %cursor, "Appended record");
        Ok(cursor)
    }

    async fn read_after(
        &self,
        topic: &str,
        after: &Cursor,
        limit: usize,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<Vec<LogRecord>, LogError> {
        let after = parse_cursor(after)?;
        let topic = self.topic(topic).await;
        // Subscribe before the first check so an append in between is not missed.
        let mut tail_rx = topic.tail_tx.subscribe();
        let mut closed_rx = self.closed_tx.subscribe();

        loop {
            self.ensure_open()?;

            let records = topic.collect_after(after, limit).await;
            if !records.is_empty() {
                return Ok(records);
            }

            tokio::select! {
                biased;

                _ = wait_for_shutdown(shutdown) => return Err(LogError::Cancelled),

                _ = closed_rx.changed() => return Err(LogError::Closed),

                changed = tail_rx.changed() => {
                    if changed.is_err() {
                        return Err(LogError::Closed);
                    }
                }
            }
        }
    }

    async fn scan(
        &self,
        topic: &str,
        after: &Cursor,
        limit: usize,
    ) -> Result<Vec<LogRecord>, LogError> {
        let after = parse_cursor(after)?;
        self.ensure_open()?;
        let topic = self.topic(topic).await;
        Ok(topic.collect_after(after, limit).await)
    }

    async fn tail(&self, topic: &str) -> Result<Cursor, LogError> {
        self.ensure_open()?;
        let topic = self.topic(topic).await;
        let records = topic.records.read().await;
        Ok(records
            .last()
            .map(|r| r.id.to_cursor())
            .unwrap_or_else(Cursor::start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::shutdown::shutdown_channel;
    use std::time::Duration;

    fn fields(n: u32) -> FieldMap {
        FieldMap::from([("n".to_string(), n.to_string())])
    }

    #[tokio::test]
    async fn test_append_order_and_exclusive_read() {
        let store = MemoryLogStore::new();
        let (_tx, mut rx) = shutdown_channel();

        let c1 = store.append("price", fields(1)).await.unwrap();
        let c2 = store.append("price", fields(2)).await.unwrap();
        let c3 = store.append("price", fields(3)).await.unwrap();
        assert!(StreamId::parse(&c1) < StreamId::parse(&c2));
        assert!(StreamId::parse(&c2) < StreamId::parse(&c3));

        let all = store
            .read_after("price", &Cursor::start(), 10, &mut rx)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].cursor, c1);

        let rest = store.read_after("price", &c1, 10, &mut rx).await.unwrap();
        assert_eq!(
            rest.iter().map(|r| r.cursor.clone()).collect::<Vec<_>>(),
            vec![c2.clone(), c3.clone()]
        );

        let limited = store.read_after("price", &c1, 1, &mut rx).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].cursor, c2);

        assert_eq!(store.tail("price").await.unwrap(), c3);
        assert_eq!(store.tail("other").await.unwrap(), Cursor::start());
    }

    #[tokio::test]
    async fn test_read_blocks_until_append() {
        let store = Arc::new(MemoryLogStore::new());
        let (_tx, mut rx) = shutdown_channel();
        let tail = store.tail("price").await.unwrap();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.read_after("price", &tail, 10, &mut rx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        store.append("price", fields(1)).await.unwrap();
        let records = reader.await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_read_is_cancellable() {
        let store = Arc::new(MemoryLogStore::new());
        let (tx, mut rx) = shutdown_channel();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .read_after("price", &Cursor::start(), 10, &mut rx)
                    .await
            })
        };

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(LogError::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_future_calls() {
        let store = Arc::new(MemoryLogStore::new());
        let (_tx, mut rx) = shutdown_channel();

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .read_after("price", &Cursor::start(), 10, &mut rx)
                    .await
            })
        };
        tokio::task::yield_now().await;

        store.close();
        assert!(matches!(reader.await.unwrap(), Err(LogError::Closed)));
        assert!(matches!(
            store.append("price", fields(1)).await,
            Err(LogError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_cursor_is_rejected() {
        let store = MemoryLogStore::new();
        let (_tx, mut rx) = shutdown_channel();
        let result = store
            .read_after("price", &Cursor::new("garbage"), 10, &mut rx)
            .await;
        assert!(matches!(result, Err(LogError::InvalidCursor(_))));
    }
}
