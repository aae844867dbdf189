//! At-least-once, ordered-per-key event bus with retry and dead-lettering
//! (§4.9).

pub mod event;
pub mod queue;
pub mod worker;

pub use event::{glob_match, Event};
pub use queue::{MemoryQueue, Queue};
#[cfg(feature = "redis-queue")]
pub use queue::RedisQueue;
pub use worker::{EventBus, EventPublisher, HandlerFn};
