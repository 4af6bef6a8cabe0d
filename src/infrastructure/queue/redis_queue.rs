use super::{QueueError, WorkQueue};
use crate::infrastructure::redis::client::RedisService;
use crate::modules::transcoding::events::JobRef;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::debug;

/// Redis list queue: producers `LPUSH`, workers `BRPOP`, giving FIFO order and
/// exclusive delivery across worker processes.
#[derive(Clone)]
pub struct RedisWorkQueue {
    // BRPOP holds its connection until it returns, so pushes get their own.
    push_conn: MultiplexedConnection,
    pop_conn: MultiplexedConnection,
    key: String,
}

impl RedisWorkQueue {
    pub async fn new(redis: &RedisService, key: impl Into<String>) -> Result<Self, QueueError> {
        Ok(Self {
            push_conn: redis.get_conn().await?,
            pop_conn: redis.get_conn().await?,
            key: key.into(),
        })
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn push(&self, job: &JobRef) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.push_conn.clone();
        let _: i64 = conn.lpush(&self.key, payload).await?;
        debug!(job_id = %job.job_id, queue = %self.key, "Pushed job reference");
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<JobRef>, QueueError> {
        let mut conn = self.pop_conn.clone();
        // BRPOP treats 0 as "block forever"; keep the wait bounded.
        let seconds = timeout.as_secs_f64().max(0.1);
        let popped: Option<(String, String)> = conn.brpop(&self.key, seconds).await?;

        match popped {
            Some((_key, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
