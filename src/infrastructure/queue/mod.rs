//! Work queue: a wake-up channel from producers to transcoding workers.
//!
//! Implementations must hand each pushed entry to exactly one consumer.

pub mod memory;
pub mod redis_queue;

use crate::modules::transcoding::events::JobRef;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error")]
    Transport(#[from] redis::RedisError),

    #[error("malformed queue payload")]
    Decode(#[from] serde_json::Error),

    #[error("queue closed")]
    Closed,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, job: &JobRef) -> Result<(), QueueError>;

    /// Waits at most `timeout` for the next entry.
    async fn pop(&self, timeout: Duration) -> Result<Option<JobRef>, QueueError>;
}

pub use memory::InMemoryWorkQueue;
pub use redis_queue::RedisWorkQueue;
