//! Per-user turn serialization

use crate::store::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per user
///
/// Tokio's mutex queues waiters in FIFO order, so a user's messages run one at
/// a time in arrival order while different users proceed in parallel.
#[derive(Default)]
pub struct TurnLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one turn
///
/// Releasing the last turn of a user drops that user's entry from the map.
pub struct TurnGuard<'a> {
    locks: &'a TurnLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's previous turns to finish
    pub async fn acquire(&self, user_id: UserId) -> TurnGuard<'_> {
        let lock = Arc::clone(self.map().entry(user_id).or_default());
        TurnGuard {
            locks: self,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<UserId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.map().len()
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.map();
        // Waiters clone the entry under the map lock, so a count of one means none is queued
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}
