//! Dispatch engine test suites
//!
//! Organized by functional area. Shared fixtures live in [`support`].

mod threading;

pub(crate) mod support {
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    /// Thread-safe record of handler calls
    #[derive(Default)]
    pub struct Journal {
        entries: Mutex<Vec<String>>,
        changed: Condvar,
    }

    impl Journal {
        pub fn record(&self, entry: impl Into<String>) {
            self.entries.lock().unwrap().push(entry.into());
            self.changed.notify_all();
        }

        pub fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }

        /// Block until at least `count` entries exist or the timeout passes
        pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<String> {
            let entries = self.entries.lock().unwrap();
            let (entries, _) = self
                .changed
                .wait_timeout_while(entries, timeout, |entries| entries.len() < count)
                .unwrap();
            entries.clone()
        }
    }

    /// A latch handlers can block on
    #[derive(Default)]
    pub struct Gate {
        open: Mutex<bool>,
        changed: Condvar,
    }

    impl Gate {
        pub fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.changed.notify_all();
        }

        pub fn wait(&self) {
            let open = self.open.lock().unwrap();
            let _open = self
                .changed
                .wait_timeout_while(open, Duration::from_secs(5), |open| !*open)
                .unwrap();
        }
    }

    pub const WAIT: Duration = Duration::from_secs(5);
}
