use super::{BrokerError, BrokerTransport, Delivery};
use crate::utils::shutdown::{ShutdownReceiver, wait_for_shutdown};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::debug;

struct Queue {
    name: String,
    /// Dropped on close so receivers see the end of the queue.
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    /// Competing consumers of the same queue take turns on this lock.
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    next_tag: AtomicU64,
    depth: AtomicUsize,
}

impl Queue {
    fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            next_tag: AtomicU64::new(1),
            depth: AtomicUsize::new(0),
        }
    }

    async fn enqueue(&self, body: Bytes) {
        let tx = self.tx.lock().await;
        if let Some(tx) = tx.as_ref() {
            if tx.send(body).is_ok() {
                self.depth.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[derive(Default)]
struct BrokerState {
    /// Exchange name -> queues bound to it.
    exchanges: HashMap<String, Vec<Arc<Queue>>>,
    queues: HashMap<String, Arc<Queue>>,
    closed: bool,
}

/// In-process fanout broker.
#[derive(Default)]
pub struct MemoryBroker {
    state: RwLock<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every queue. Consumers drain what is left and then stop.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        for queue in state.queues.values() {
            queue.tx.lock().await.take();
        }
    }

    /// Messages waiting in `queue`, or `None` if it does not exist.
    pub async fn pending(&self, queue: &str) -> Option<usize> {
        let state = self.state.read().await;
        state
            .queues
            .get(queue)
            .map(|q| q.depth.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn declare_fanout(&self, exchange: &str) -> Result<(), BrokerError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state.exchanges.entry(exchange.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, exchange: &str, body: Bytes) -> Result<(), BrokerError> {
        let state = self.state.read().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        let queues = state
            .exchanges
            .get(exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;

        for queue in queues {
            queue.enqueue(body.clone()).await;
        }
        debug!(exchange, bound_queues = queues.len(), "Published message");
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }

        let queue = Arc::clone(
            state
                .queues
                .entry(queue.to_string())
                .or_insert_with(|| Arc::new(Queue::new(queue))),
        );
        let bound = state.exchanges.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q.name == queue.name) {
            debug!(queue = %queue.name, exchange, "Bound queue to exchange");
            bound.push(queue);
        }
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        shutdown: &mut ShutdownReceiver,
    ) -> Result<Option<Delivery>, BrokerError> {
        let queue = self
            .state
            .read()
            .await
            .queues
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;

        let mut rx = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Err(BrokerError::Cancelled),
            rx = queue.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => Err(BrokerError::Cancelled),
            body = rx.recv() => Ok(body.map(|body| {
                queue.depth.fetch_sub(1, Ordering::Relaxed);
                Delivery {
                    queue: queue.name.clone(),
                    delivery_tag: queue.next_tag.fetch_add(1, Ordering::Relaxed),
                    body,
                }
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::shutdown::shutdown_channel;
    use std::time::Duration;

    async fn broker_with_exchange() -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker.declare_fanout("price").await.unwrap();
        broker
    }

    #[tokio::test]
    async fn test_fanout_copies_to_every_bound_queue() {
        let broker = broker_with_exchange().await;
        let (_tx, mut rx) = shutdown_channel();
        broker.bind_queue("price_0", "price").await.unwrap();
        broker.bind_queue("price_1", "price").await.unwrap();

        broker.publish("price", Bytes::from_static(b"a")).await.unwrap();

        for queue in ["price_0", "price_1"] {
            let delivery = broker.receive(queue, &mut rx).await.unwrap().unwrap();
            assert_eq!(delivery.body, Bytes::from_static(b"a"));
            assert_eq!(delivery.queue, queue);
        }
    }

    #[tokio::test]
    async fn test_late_binding_misses_earlier_messages() {
        let broker = broker_with_exchange().await;
        broker.bind_queue("early", "price").await.unwrap();
        broker.publish("price", Bytes::from_static(b"first")).await.unwrap();
        broker.bind_queue("late", "price").await.unwrap();

        assert_eq!(broker.pending("early").await, Some(1));
        assert_eq!(broker.pending("late").await, Some(0));
    }

    #[tokio::test]
    async fn test_binding_is_idempotent() {
        let broker = broker_with_exchange().await;
        broker.bind_queue("price_0", "price").await.unwrap();
        broker.bind_queue("price_0", "price").await.unwrap();
        broker.publish("price", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(broker.pending("price_0").await, Some(1));
    }

    #[tokio::test]
    async fn test_publish_without_queues_is_not_an_error() {
        let broker = broker_with_exchange().await;
        broker.publish("price", Bytes::from_static(b"x")).await.unwrap();
        assert!(matches!(
            broker.publish("missing", Bytes::new()).await,
            Err(BrokerError::UnknownExchange(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_cancel_and_close() {
        let broker = Arc::new(broker_with_exchange().await);
        broker.bind_queue("q", "price").await.unwrap();

        let (tx, mut rx) = shutdown_channel();
        let waiting = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.receive("q", &mut rx).await })
        };
        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(BrokerError::Cancelled)));

        let (_tx, mut rx) = shutdown_channel();
        broker.publish("price", Bytes::from_static(b"last")).await.unwrap();
        broker.close().await;
        let delivery = broker.receive("q", &mut rx).await.unwrap();
        assert_eq!(delivery.map(|d| d.body), Some(Bytes::from_static(b"last")));
        assert_eq!(broker.receive("q", &mut rx).await.unwrap(), None);
        assert!(matches!(
            broker.publish("price", Bytes::new()).await,
            Err(BrokerError::Closed)
        ));
    }
}
