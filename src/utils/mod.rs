// Utility functions

pub mod retry;

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
/// The mutex state may be inconsistent, so use with caution.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Read-lock counterpart of [`lock_mutex_recover`]
pub fn read_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("RwLock was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Write-lock counterpart of [`lock_mutex_recover`]
pub fn write_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("RwLock was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Truncate a string to at most `max_chars` characters, appending an ellipsis
/// when anything was cut. Never splits a UTF-8 code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_short_input_untouched() {
        assert_eq!(truncate_chars("market data", 50), "market data");
    }

    #[test]
    fn test_truncate_chars_cuts_and_marks() {
        assert_eq!(truncate_chars("abcdefgh", 3), "abc...");
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }

    #[test]
    fn test_lock_mutex_recover() {
        let mutex = Mutex::new(5);
        *lock_mutex_recover(&mutex) += 1;
        assert_eq!(*lock_mutex_recover(&mutex), 6);
    }

    #[test]
    fn test_rwlock_helpers() {
        let lock = RwLock::new(vec![1]);
        write_recover(&lock).push(2);
        assert_eq!(read_recover(&lock).len(), 2);
    }
}
