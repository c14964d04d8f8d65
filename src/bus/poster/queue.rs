//! FIFO of deliveries waiting for a worker

use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::message::Envelope;
use crate::bus::subscription::Subscription;
use crate::core::sync::handle_mutex_poison;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A message waiting to be delivered to one subscription
pub struct PendingPost {
    pub subscription: Arc<Subscription>,
    pub envelope: Envelope,
}

impl PendingPost {
    pub fn new(subscription: Arc<Subscription>, envelope: Envelope) -> Self {
        Self {
            subscription,
            envelope,
        }
    }
}

#[derive(Default)]
pub(crate) struct PendingPostQueue {
    items: Mutex<VecDeque<PendingPost>>,
    available: Condvar,
}

impl PendingPostQueue {
    fn lock(&self) -> EventBusResult<MutexGuard<'_, VecDeque<PendingPost>>> {
        handle_mutex_poison(self.items.lock(), |message| {
            EventBusError::Synchronisation { message }
        })
    }

    pub fn enqueue(&self, post: PendingPost) -> EventBusResult<()> {
        self.lock()?.push_back(post);
        self.available.notify_all();
        Ok(())
    }

    pub fn poll(&self) -> EventBusResult<Option<PendingPost>> {
        Ok(self.lock()?.pop_front())
    }

    /// Wait up to `timeout` for a post to arrive
    pub fn poll_timeout(&self, timeout: Duration) -> EventBusResult<Option<PendingPost>> {
        let deadline = Instant::now() + timeout;
        let mut items = self.lock()?;
        loop {
            if let Some(post) = items.pop_front() {
                return Ok(Some(post));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = handle_mutex_poison(
                self.available.wait_timeout(items, deadline - now),
                |message| EventBusError::Synchronisation { message },
            )?;
            items = guard;
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> EventBusResult<usize> {
        Ok(self.lock()?.len())
    }
}
