//! One executor job per async delivery

use crate::bus::bus::EventBus;
use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::poster::queue::{PendingPost, PendingPostQueue};
use crate::core::error_handling::log_error_with_context;

#[derive(Default)]
pub(crate) struct AsyncPoster {
    queue: PendingPostQueue,
}

impl AsyncPoster {
    pub fn enqueue(&self, bus: &EventBus, post: PendingPost) -> EventBusResult<()> {
        self.queue.enqueue(post)?;
        let worker = bus.clone();
        bus.executor()
            .execute(Box::new(move || worker.async_poster().run_one(&worker)))
    }

    /// Each job delivers exactly one post; an empty queue means the jobs and
    /// posts went out of step
    fn run_one(&self, bus: &EventBus) {
        let result = self
            .queue
            .poll()
            .and_then(|post| post.ok_or(EventBusError::NoPendingPost { poster: "async" }))
            .and_then(|post| bus.invoke_pending(post));
        if let Err(e) = result {
            log_error_with_context(&e, "Async delivery failed");
        }
    }
}
