use std::sync::{Mutex, MutexGuard, OnceLock};

/// Serializes tests that change the process-wide working directory.
pub(crate) fn lock_current_dir() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
