//! Pluggable queue backend: a `RedisQueue` (real, list-backed per §6) and a
//! `MemoryQueue` (in-process `VecDeque`, used by tests), grounded on the
//! teacher's pattern of a trait-object storage backend with a `Null`/fake
//! implementation for the same trait.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::event::Event;
use crate::error::EventBusError;

/// A named queue of pending events, plus a dead-letter sibling per queue
/// name (`<queue>:failed`, per §6).
#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, queue_name: &str, event: Event) -> Result<(), EventBusError>;

    /// Pops up to `batch_size` events that are due (`scheduled_for <= now`),
    /// leaving not-yet-due events in place.
    async fn poll_batch(&self, queue_name: &str, batch_size: usize) -> Result<Vec<Event>, EventBusError>;

    async fn dead_letter(&self, queue_name: &str, event: Event) -> Result<(), EventBusError>;

    async fn dead_letter_contents(&self, queue_name: &str) -> Result<Vec<Event>, EventBusError>;
}

/// `VecDeque`-backed fake, FIFO per queue name.
#[derive(Default)]
pub struct MemoryQueue {
    queues: DashMap<String, Mutex<VecDeque<Event>>>,
    dead_letters: DashMap<String, Mutex<Vec<Event>>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, queue_name: &str, event: Event) -> Result<(), EventBusError> {
        self.queues.entry(queue_name.to_string()).or_default().lock().push_back(event);
        Ok(())
    }

    async fn poll_batch(&self, queue_name: &str, batch_size: usize) -> Result<Vec<Event>, EventBusError> {
        let now = Utc::now();
        let mut guard = self.queues.entry(queue_name.to_string()).or_default().value().lock();
        let mut due = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(event) = guard.pop_front() {
            if due.len() < batch_size && event.scheduled_for <= now {
                due.push(event);
            } else {
                remaining.push_back(event);
            }
        }
        *guard = remaining;
        Ok(due)
    }

    async fn dead_letter(&self, queue_name: &str, event: Event) -> Result<(), EventBusError> {
        self.dead_letters
            .entry(format!("{queue_name}:failed"))
            .or_default()
            .lock()
            .push(event);
        Ok(())
    }

    async fn dead_letter_contents(&self, queue_name: &str) -> Result<Vec<Event>, EventBusError> {
        Ok(self
            .dead_letters
            .get(&format!("{queue_name}:failed"))
            .map(|entries| entries.lock().clone())
            .unwrap_or_default())
    }
}

/// Redis-backed queue: each named queue is a Redis list holding
/// JSON-encoded [`Event`]s, matching §6's "Redis-compatible list/stream".
#[cfg(feature = "redis-queue")]
pub struct RedisQueue {
    client: redis::Client,
}

#[cfg(feature = "redis-queue")]
impl RedisQueue {
    /// # Errors
    /// [`EventBusError::Queue`] if the Redis URL cannot be parsed.
    pub fn new(redis_url: &str) -> Result<Self, EventBusError> {
        let client = redis::Client::open(redis_url).map_err(|e| EventBusError::Queue(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, EventBusError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| EventBusError::Queue(e.to_string()))
    }
}

#[cfg(feature = "redis-queue")]
#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, queue_name: &str, event: Event) -> Result<(), EventBusError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&event).map_err(|e| EventBusError::Queue(e.to_string()))?;
        conn.rpush::<_, _, ()>(queue_name, payload)
            .await
            .map_err(|e| EventBusError::Queue(e.to_string()))
    }

    async fn poll_batch(&self, queue_name: &str, batch_size: usize) -> Result<Vec<Event>, EventBusError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let mut due = Vec::new();
        let mut requeue: Vec<String> = Vec::new();
        for _ in 0..batch_size {
            let raw: Option<String> = conn.lpop(queue_name, None).await.map_err(|e| EventBusError::Queue(e.to_string()))?;
            let Some(raw) = raw else { break };
            match serde_json::from_str::<Event>(&raw) {
                Ok(event) if event.scheduled_for <= Utc::now() => due.push(event),
                Ok(_) => requeue.push(raw),
                Err(e) => return Err(EventBusError::Queue(e.to_string())),
            }
        }
        for raw in requeue {
            conn.rpush::<_, _, ()>(queue_name, raw)
                .await
                .map_err(|e| EventBusError::Queue(e.to_string()))?;
        }
        Ok(due)
    }

    async fn dead_letter(&self, queue_name: &str, event: Event) -> Result<(), EventBusError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&event).map_err(|e| EventBusError::Queue(e.to_string()))?;
        conn.rpush::<_, _, ()>(format!("{queue_name}:failed"), payload)
            .await
            .map_err(|e| EventBusError::Queue(e.to_string()))
    }

    async fn dead_letter_contents(&self, queue_name: &str) -> Result<Vec<Event>, EventBusError> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let raws: Vec<String> = conn
            .lrange(format!("{queue_name}:failed"), 0, -1)
            .await
            .map_err(|e| EventBusError::Queue(e.to_string()))?;
        raws.into_iter()
            .map(|raw| serde_json::from_str(&raw).map_err(|e| EventBusError::Queue(e.to_string())))
            .collect()
    }
}
