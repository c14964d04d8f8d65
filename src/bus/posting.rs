//! Per-thread posting state
//!
//! Each thread keeps one state per bus, keyed by the bus id. Handlers are
//! never invoked while the state is borrowed, so a handler may post or cancel
//! freely.

use crate::bus::message::Envelope;
use crate::bus::subscription::Subscription;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static POSTING_STATES: RefCell<HashMap<u64, PostingThreadState>> = RefCell::new(HashMap::new());
}

#[derive(Default)]
pub(crate) struct PostingThreadState {
    pub queue: VecDeque<Envelope>,
    pub is_posting: bool,
    pub is_main_thread: bool,
    pub canceled: bool,
    pub current: Option<(Envelope, Arc<Subscription>)>,
}

pub(crate) fn next_bus_id() -> u64 {
    NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed)
}

/// Run `f` against this thread's state for the bus
pub(crate) fn with_state<R>(bus_id: u64, f: impl FnOnce(&mut PostingThreadState) -> R) -> R {
    POSTING_STATES.with(|states| f(states.borrow_mut().entry(bus_id).or_default()))
}

/// Resets the thread's state to idle when a top-level post ends, even on error
pub(crate) struct PostingReset {
    bus_id: u64,
}

impl PostingReset {
    pub fn new(bus_id: u64) -> Self {
        Self { bus_id }
    }
}

impl Drop for PostingReset {
    fn drop(&mut self) {
        // Thread-local storage may already be gone during thread teardown
        let _ = POSTING_STATES.try_with(|states| {
            let mut states = states.borrow_mut();
            let idle = match states.get_mut(&self.bus_id) {
                Some(state) => {
                    state.is_posting = false;
                    state.is_main_thread = false;
                    state.queue.is_empty() && !state.canceled
                }
                None => false,
            };
            // Messages left behind by a failed post stay queued for the next one
            if idle {
                states.remove(&self.bus_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_per_bus() {
        let first = next_bus_id();
        let second = next_bus_id();
        assert_ne!(first, second);

        with_state(first, |state| state.is_posting = true);
        assert!(with_state(first, |state| state.is_posting));
        assert!(!with_state(second, |state| state.is_posting));

        drop(PostingReset::new(first));
        assert!(!with_state(first, |state| state.is_posting));
    }

    #[test]
    fn test_reset_keeps_queued_messages() {
        let bus_id = next_bus_id();
        with_state(bus_id, |state| {
            state.is_posting = true;
            state.queue.push_back(Envelope::new(1i32));
        });

        drop(PostingReset::new(bus_id));

        with_state(bus_id, |state| {
            assert!(!state.is_posting);
            assert_eq!(state.queue.len(), 1);
        });
    }

    #[test]
    fn test_states_are_per_thread() {
        let bus_id = next_bus_id();
        with_state(bus_id, |state| state.is_posting = true);

        let other = std::thread::spawn(move || with_state(bus_id, |state| state.is_posting))
            .join()
            .unwrap();
        assert!(!other);
    }
}
