//! Per-device mutual exclusion for the poll → sync → drain sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Prune idle entries once the map grows past this many devices.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of one async mutex per device id.
#[derive(Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>,
}

/// Proof that the caller holds the lock for `device_id`.
///
/// Sync and drain operations take a guard instead of a bare id so they can
/// only run inside the critical section.
pub struct DeviceGuard {
    device_id: i32,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceGuard {
    pub fn device_id(&self) -> i32 {
        self.device_id
    }
}

impl std::fmt::Debug for DeviceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGuard")
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a device.
    pub async fn acquire(&self, device_id: i32) -> DeviceGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                retain_held(&mut locks);
            }
            locks.entry(device_id).or_default().clone()
        };
        DeviceGuard {
            device_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of devices with a lock entry, held or idle.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    fn prune(&self) {
        retain_held(&mut self.locks.lock().unwrap_or_else(|e| e.into_inner()));
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop entries nobody holds or waits on.
fn retain_held(locks: &mut HashMap<i32, Arc<AsyncMutex<()>>>) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_device_is_serialized() {
        let locks = Arc::new(DeviceLocks::new());
        let guard = locks.acquire(7).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(7).await.device_id() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_different_devices_do_not_block() {
        let locks = DeviceLocks::new();
        let _a = locks.acquire(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = DeviceLocks::new();
        let held = locks.acquire(1).await;
        drop(locks.acquire(2).await);
        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
