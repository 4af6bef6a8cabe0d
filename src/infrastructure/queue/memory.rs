use super::{QueueError, WorkQueue};
use crate::modules::transcoding::events::JobRef;
use async_trait::async_trait;
use std::time::Duration;

/// Unbounded MPMC queue for single-process deployments and tests.
#[derive(Clone)]
pub struct InMemoryWorkQueue {
    tx: async_channel::Sender<JobRef>,
    rx: async_channel::Receiver<JobRef>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn push(&self, job: &JobRef) -> Result<(), QueueError> {
        self.tx.send(*job).await.map_err(|_| QueueError::Closed)
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<JobRef>, QueueError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(job)) => Ok(Some(job)),
            Ok(Err(_)) => Err(QueueError::Closed),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job_ref() -> JobRef {
        JobRef::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn pops_in_push_order() {
        let queue = InMemoryWorkQueue::new();
        let (first, second) = (job_ref(), job_ref());
        queue.push(&first).await.unwrap();
        queue.push(&second).await.unwrap();

        let timeout = Duration::from_millis(50);
        assert_eq!(queue.pop(timeout).await.unwrap(), Some(first));
        assert_eq!(queue.pop(timeout).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn empty_pop_returns_after_timeout() {
        let queue = InMemoryWorkQueue::new();
        let popped = queue.pop(Duration::from_millis(20)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn each_entry_goes_to_one_consumer() {
        let queue = InMemoryWorkQueue::new();
        let other = queue.clone();
        queue.push(&job_ref()).await.unwrap();

        let timeout = Duration::from_millis(20);
        let a = queue.pop(timeout).await.unwrap();
        let b = other.pop(timeout).await.unwrap();
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
    }
}
