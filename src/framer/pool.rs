use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::DEFAULT_MAX_PROCESSES;
use crate::error::{Result, VidError};

/// Permission to run one extraction; returned to the pool on drop
pub type Token = OwnedSemaphorePermit;

/// Counting pool bounding how many extractions run at once.
///
/// Clones share the same tokens, so one pool can outlive several
/// dispatchers.
#[derive(Debug, Clone)]
pub struct TokenPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl TokenPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_MAX_PROCESSES } else { capacity };
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Wait until a token is free
    pub async fn acquire(&self) -> Result<Token> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| VidError::Cancelled)
    }
}

impl Default for TokenPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PROCESSES)
    }
}
