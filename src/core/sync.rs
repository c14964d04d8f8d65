//! Lock poisoning helpers
//!
//! A panic while a lock is held poisons it. The bus never panics under its
//! own locks, but handler panics are caught on threads that may; these helpers
//! turn poisoning into the caller's error type instead of propagating the panic.

use std::sync::{LockResult, RwLockReadGuard, RwLockWriteGuard};

/// Convert a poisoned lock result into an application error
///
/// Works for any `LockResult`, including `Condvar::wait_timeout`.
///
/// ```
/// use std::sync::Mutex;
/// use msgbus::core::sync::handle_mutex_poison;
/// use msgbus::bus::api::EventBusError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(
///     mutex.lock(),
///     |message| EventBusError::Synchronisation { message }
/// ).unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(
            format!(
                "Internal synchronisation error (lock poisoned). A panic occurred while the lock was held: {}",
                poison_err
            )
        )
    })
}

/// Read side of an `RwLock`, poisoned when a writer panicked
pub fn handle_rwlock_read<T, E>(
    result: LockResult<RwLockReadGuard<T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<T>, E> {
    result.map_err(|poison_err| {
        error_constructor(
            format!(
                "Internal synchronisation error (read lock poisoned): {}",
                poison_err
            )
        )
    })
}

/// Write side of an `RwLock`
pub fn handle_rwlock_write<T, E>(
    result: LockResult<RwLockWriteGuard<T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<T>, E> {
    result.map_err(|poison_err| {
        error_constructor(
            format!(
                "Internal synchronisation error (write lock poisoned): {}",
                poison_err
            )
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Condvar, Mutex, RwLock};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct TestError {
        message: String,
    }

    fn poison<T: Send + Sync + 'static>(lock: Arc<RwLock<T>>) {
        let _ = thread::spawn(move || {
            let _guard = lock.write().unwrap();
            panic!("poisoning lock for test");
        })
        .join();
    }

    #[test]
    fn test_healthy_locks_pass_through() {
        let mutex = Mutex::new(1);
        let rwlock = RwLock::new(2);

        assert_eq!(
            *handle_mutex_poison(mutex.lock(), |message| TestError { message }).unwrap(),
            1
        );
        assert_eq!(
            *handle_rwlock_read(rwlock.read(), |message| TestError { message }).unwrap(),
            2
        );
        *handle_rwlock_write(rwlock.write(), |message| TestError { message }).unwrap() = 3;
        assert_eq!(*rwlock.read().unwrap(), 3);
    }

    #[test]
    fn test_poisoned_rwlock_becomes_error() {
        let lock = Arc::new(RwLock::new(Vec::<u32>::new()));
        poison(Arc::clone(&lock));

        let read = handle_rwlock_read(lock.read(), |message| TestError { message });
        let write = handle_rwlock_write(lock.write(), |message| TestError { message });

        assert!(read.unwrap_err().message.contains("read lock poisoned"));
        assert!(write.unwrap_err().message.contains("write lock poisoned"));
    }

    #[test]
    fn test_condvar_wait_result_is_accepted() {
        let mutex = Mutex::new(0);
        let condvar = Condvar::new();
        let guard = mutex.lock().unwrap();

        let (guard, timeout) = handle_mutex_poison(
            condvar.wait_timeout(guard, Duration::from_millis(1)),
            |message| TestError { message },
        )
        .unwrap();
        assert!(timeout.timed_out());
        assert_eq!(*guard, 0);
    }
}
