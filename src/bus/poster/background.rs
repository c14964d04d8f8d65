//! Single worker that drains background deliveries
//!
//! At most one drain loop runs per bus. The loop exits once the queue stays
//! empty for the poll timeout; the emptiness is rechecked under the running
//! guard so an enqueue racing with the exit always starts a new loop.

use crate::bus::bus::EventBus;
use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::poster::queue::{PendingPost, PendingPostQueue};
use crate::core::error_handling::log_error_with_context;
use crate::core::sync::handle_mutex_poison;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub(crate) struct BackgroundPoster {
    queue: PendingPostQueue,
    running: Mutex<bool>,
    poll_timeout: Duration,
}

impl BackgroundPoster {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            queue: PendingPostQueue::default(),
            running: Mutex::new(false),
            poll_timeout,
        }
    }

    fn running(&self) -> EventBusResult<MutexGuard<'_, bool>> {
        handle_mutex_poison(self.running.lock(), |message| {
            EventBusError::Synchronisation { message }
        })
    }

    pub fn enqueue(&self, bus: &EventBus, post: PendingPost) -> EventBusResult<()> {
        {
            let mut running = self.running()?;
            self.queue.enqueue(post)?;
            if *running {
                return Ok(());
            }
            *running = true;
        }
        // Submitted outside the guard in case the executor runs jobs inline
        let worker = bus.clone();
        let submitted = bus
            .executor()
            .execute(Box::new(move || worker.background_poster().run(&worker)));
        if submitted.is_err() {
            *self.running()? = false;
        }
        submitted
    }

    fn run(&self, bus: &EventBus) {
        log::trace!("Background poster started");
        loop {
            match self.next() {
                Ok(Some(post)) => {
                    if let Err(e) = bus.invoke_pending(post) {
                        log_error_with_context(&e, "Background delivery failed");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log_error_with_context(&e, "Background poster stopped");
                    if let Ok(mut running) = self.running() {
                        *running = false;
                    }
                    break;
                }
            }
        }
        log::trace!("Background poster idle");
    }

    /// Next post, or `None` after clearing the running flag
    fn next(&self) -> EventBusResult<Option<PendingPost>> {
        if let Some(post) = self.queue.poll_timeout(self.poll_timeout)? {
            return Ok(Some(post));
        }
        let mut running = self.running()?;
        let post = self.queue.poll()?;
        if post.is_none() {
            *running = false;
        }
        Ok(post)
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running().map(|running| *running).unwrap_or(false)
    }
}
