//! Event bus: publish/subscribe over a pluggable [`Queue`], with
//! per-correlation-key ordering and retry-then-dead-letter on handler
//! failure. Workers follow the teacher's `BackgroundRunnable` shape (pull
//! a batch, dispatch, ack/retry per item) from `service::worker`, and
//! correlation-key routing reuses the teacher's partition-hash idiom from
//! `cluster::traits::ClusterPartitionService::hash_to_partition`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, instrument, warn};

use super::event::{glob_match, Event};
use super::queue::Queue;
use crate::config::EventBusConfig;
use crate::error::EventBusError;
use crate::pool::backoff_delay;

pub type HandlerFn = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<(), EventBusError>> + Send + Sync>;

/// Object-safe facade over `EventBus<Q>::publish`, so `Environment` can hold
/// `Arc<dyn EventPublisher>` without becoming generic over the queue backend.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), EventBusError>;
}

#[async_trait::async_trait]
impl<Q: Queue + 'static> EventPublisher for EventBus<Q> {
    async fn publish(&self, event: Event) -> Result<(), EventBusError> {
        EventBus::publish(self, event).await
    }
}

struct Subscription {
    pattern: String,
    handler: HandlerFn,
    max_retries: u32,
}

/// Owns the queue, the registered subscriptions, and the worker lanes
/// that dispatch to them.
pub struct EventBus<Q: Queue + 'static> {
    queue: Arc<Q>,
    config: EventBusConfig,
    queue_name: String,
    subscriptions: Arc<parking_lot::RwLock<Vec<Subscription>>>,
    lanes: Vec<mpsc::Sender<Event>>,
    lane_handles: Vec<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<Q: Queue + 'static> EventBus<Q> {
    #[must_use]
    pub fn new(queue: Arc<Q>, queue_name: impl Into<String>, config: EventBusConfig) -> Self {
        Self {
            queue,
            config,
            queue_name: queue_name.into(),
            subscriptions: Arc::new(parking_lot::RwLock::new(Vec::new())),
            lanes: Vec::new(),
            lane_handles: Vec::new(),
            dispatcher: None,
        }
    }

    /// Enqueues `event` on the configured queue.
    ///
    /// # Errors
    /// [`EventBusError::Queue`] if the backend rejects the write.
    #[instrument(name = "event_bus.publish", skip(self, event), fields(event = %event.name))]
    pub async fn publish(&self, event: Event) -> Result<(), EventBusError> {
        self.queue.enqueue(&self.queue_name, event).await
    }

    /// Registers a handler for every event whose name matches `pattern`.
    pub fn subscribe(&self, pattern: impl Into<String>, handler: HandlerFn, max_retries: u32) {
        self.subscriptions.write().push(Subscription {
            pattern: pattern.into(),
            handler,
            max_retries,
        });
    }

    /// Spawns the dispatcher and one worker lane per
    /// `config.worker_concurrency`. Events with the same `correlation_id`
    /// hash to the same lane, so a single lane's FIFO processing gives
    /// per-key ordering; different keys may land on different lanes and
    /// interleave freely.
    pub fn start(&mut self) {
        let lane_count = self.config.worker_concurrency.max(1);
        let mut senders = Vec::with_capacity(lane_count as usize);
        for _ in 0..lane_count {
            let (tx, mut rx) = mpsc::channel::<Event>(256);
            let subscriptions = Arc::clone(&self.subscriptions);
            let queue = Arc::clone(&self.queue);
            let queue_name = self.queue_name.clone();
            let retry = self.config.clone();
            let handle = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    dispatch_one(&subscriptions, &queue, &queue_name, &retry, event).await;
                }
            });
            senders.push(tx);
            self.lane_handles.push(handle);
        }
        self.lanes = senders;

        let lanes = self.lanes.clone();
        let queue = Arc::clone(&self.queue);
        let queue_name = self.queue_name.clone();
        let batch_size = self.config.worker_concurrency.max(1) as usize * 32;
        self.dispatcher = Some(tokio::spawn(async move {
            loop {
                match queue.poll_batch(&queue_name, batch_size).await {
                    Ok(batch) if batch.is_empty() => {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                    Ok(batch) => {
                        for event in batch {
                            let lane = lane_for(&event, lanes.len());
                            if lanes[lane].send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        error!(%err, "event queue poll failed");
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                }
            }
        }));
    }

    /// Stops the dispatcher and drains worker lanes.
    pub async fn shutdown(self) {
        if let Some(handle) = self.dispatcher {
            handle.abort();
        }
        drop(self.lanes);
        for handle in self.lane_handles {
            let _ = handle.await;
        }
    }
}

fn lane_for(event: &Event, lane_count: usize) -> usize {
    match &event.correlation_id {
        Some(key) => {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            (hasher.finish() as usize) % lane_count.max(1)
        }
        None => 0,
    }
}

async fn dispatch_one<Q: Queue>(
    subscriptions: &parking_lot::RwLock<Vec<Subscription>>,
    queue: &Q,
    queue_name: &str,
    config: &EventBusConfig,
    event: Event,
) {
    let matching: Vec<(HandlerFn, u32)> = subscriptions
        .read()
        .iter()
        .filter(|sub| glob_match(&sub.pattern, &event.name))
        .map(|sub| (Arc::clone(&sub.handler), sub.max_retries))
        .collect();

    for (handler, max_retries) in matching {
        let max_retries = max_retries.max(config.max_delivery_attempts);
        let mut attempt = event.attempt;
        let mut current = event.clone();
        loop {
            match handler(current.clone()).await {
                Ok(()) => break,
                Err(err) if attempt >= max_retries => {
                    // `current.attempt` still reflects the delivery that just failed;
                    // the dead-lettered record should carry the total number of
                    // delivery attempts made (spec.md property 8: `max_retries + 1`).
                    current.attempt = attempt + 1;
                    warn!(name = %current.name, attempts = current.attempt, %err, "event exceeded max retries, dead-lettering");
                    if let Err(dlq_err) = queue.dead_letter(queue_name, current).await {
                        error!(%dlq_err, "failed to write to dead-letter queue");
                    }
                    break;
                }
                Err(_) => {
                    let delay = backoff_delay(
                        attempt,
                        std::time::Duration::from_millis(50),
                        std::time::Duration::from_millis(5_000),
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    current = current.redelivered();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::queue::MemoryQueue;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn handler_matching_pattern_is_invoked() {
        let queue = Arc::new(MemoryQueue::new());
        let mut bus = EventBus::new(Arc::clone(&queue), "events", EventBusConfig::default());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        bus.subscribe(
            "order.*",
            Arc::new(move |_event| {
                let calls = Arc::clone(&calls_clone);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
            3,
        );
        bus.start();
        bus.publish(Event::new("order.created", serde_json::json!({}))).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn failing_handler_is_dead_lettered_after_max_retries() {
        let queue = Arc::new(MemoryQueue::new());
        let mut bus = EventBus::new(Arc::clone(&queue), "events", EventBusConfig::default());
        bus.subscribe(
            "*",
            Arc::new(|_event| Box::pin(async move { Err(EventBusError::Queue("boom".to_string())) })),
            1,
        );
        bus.start();
        bus.publish(Event::new("anything", serde_json::json!({}))).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let dead = queue.dead_letter_contents("events").await.unwrap();
        assert_eq!(dead.len(), 1);
        bus.shutdown().await;
    }
}
