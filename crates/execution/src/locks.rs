// In crates/execution/src/locks.rs

use core_types::{Symbol, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Key = (UserId, Symbol);

/// Above this many entries, idle locks are dropped on the next acquisition.
const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per `(user, symbol)` position.
///
/// Every read-plan-commit of a position runs under its lock, so the trading
/// service and the engine never plan against the same snapshot at once.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the position. Released when the guard drops.
    pub async fn lock(&self, user_id: UserId, symbol: &Symbol) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle lock.
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks
                .entry((user_id, symbol.clone()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn same_position_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let user = UserId::new();
        let acme = Symbol::new("ACME").unwrap();

        let guard = locks.lock(user, &acme).await;
        let waiter = {
            let locks = locks.clone();
            let acme = acme.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(user, &acme).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_positions_do_not_block() {
        let locks = KeyedLocks::new();
        let user = UserId::new();

        let _acme = locks.lock(user, &Symbol::new("ACME").unwrap()).await;
        let _xyz = locks.lock(user, &Symbol::new("XYZ").unwrap()).await;
        let _other_user = locks.lock(UserId::new(), &Symbol::new("ACME").unwrap()).await;
        assert_eq!(locks.len(), 3);
    }
}
