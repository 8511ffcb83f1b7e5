//! Per-tournament mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::models::TournamentId;

/// One lock per tournament id. Cycles on the same tournament queue up;
/// different tournaments never wait on each other.
#[derive(Debug, Clone, Default)]
pub struct TournamentLocks {
    locks: Arc<RwLock<HashMap<TournamentId, Arc<Mutex<()>>>>>,
}

impl TournamentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a tournament.
    pub async fn acquire(&self, id: TournamentId) -> OwnedMutexGuard<()> {
        let existing = self.locks.read().await.get(&id).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .locks
                .write()
                .await
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
        };
        lock.lock_owned().await
    }

    /// Whether a cycle currently holds the tournament.
    pub async fn is_locked(&self, id: TournamentId) -> bool {
        match self.locks.read().await.get(&id) {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_tournament_serializes() {
        let locks = TournamentLocks::new();
        let guard = locks.acquire(1).await;
        assert!(locks.is_locked(1).await);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(!locks.is_locked(1).await);
    }

    #[tokio::test]
    async fn test_different_tournaments_are_independent() {
        let locks = TournamentLocks::new();
        let _first = locks.acquire(1).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2)).await;
        assert!(second.is_ok());
    }
}
