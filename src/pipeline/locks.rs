use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::core_state::CoreError;

/// Above this many entries, idle locks are dropped on the next acquire.
const PRUNE_THRESHOLD: usize = 256;

/// One async mutex per patient, so submissions for the same patient run
/// one after the other while different patients proceed in parallel.
/// Waiters are served in FIFO order.
#[derive(Default)]
pub struct PatientLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl PatientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, patient_id: Uuid) -> Result<OwnedMutexGuard<()>, CoreError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| CoreError::LockPoisoned)?;
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle lock
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(patient_id).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
