use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Per-user reader/writer locks over the on-disk mailbox store.
///
/// Each user maps to exactly one `RwLock`, allocated on first reference and
/// never evicted, so long-run memory is bounded by the set of users ever
/// seen. Locks are per-user rather than per-folder: a cross-folder move
/// within one user serializes, while different users proceed in parallel.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the lock for a user, creating it atomically on first use.
    pub fn user_lock(&self, username: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

/// Acquire a shared (read) guard on a user's lock.
///
/// A poisoned lock is recovered rather than propagated: the guarded state is
/// the on-disk store, which a panicking writer leaves no more inconsistent
/// than a crash would.
pub fn read(lock: &RwLock<()>) -> RwLockReadGuard<'_, ()> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Acquire an exclusive (write) guard on a user's lock.
pub fn write(lock: &RwLock<()>) -> RwLockWriteGuard<'_, ()> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
