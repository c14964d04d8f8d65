//! Main thread affinity
//!
//! The bus has no notion of a main thread of its own. A host that has one
//! supplies [`MainThreadSupport`]; [`ChannelMainThreadSupport`] is a ready-made
//! implementation for hosts that can drain a queue from their main loop.
//!
//! ```
//! use msgbus::bus::api::{ChannelMainThreadSupport, EventBus};
//! use std::sync::Arc;
//!
//! let (support, mut main_loop) = ChannelMainThreadSupport::new();
//! let bus = EventBus::builder()
//!     .with_main_thread_support(Arc::new(support))
//!     .build()
//!     .unwrap();
//! # let _ = bus;
//! // ... in the host's main loop:
//! main_loop.run_pending();
//! ```

use crate::bus::bus::EventBus;
use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::poster::queue::PendingPost;
use crate::core::error_handling::log_error_with_context;
use std::thread::ThreadId;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// A delivery handed to the main thread
pub struct PendingDelivery {
    bus: EventBus,
    post: PendingPost,
}

impl PendingDelivery {
    pub(crate) fn new(bus: EventBus, post: PendingPost) -> Self {
        Self { bus, post }
    }

    /// Invoke the handler unless it was unregistered since queuing
    pub fn deliver(self) -> EventBusResult<()> {
        self.bus.invoke_pending(self.post)
    }
}

/// Host capability for main thread delivery
pub trait MainThreadSupport: Send + Sync {
    fn is_main_thread(&self) -> bool;

    /// Queue a delivery for the main thread, preserving order
    fn enqueue(&self, delivery: PendingDelivery) -> EventBusResult<()>;
}

/// Main thread support backed by an unbounded channel
///
/// The thread that creates it is the main thread.
pub struct ChannelMainThreadSupport {
    thread: ThreadId,
    sender: UnboundedSender<PendingDelivery>,
}

impl ChannelMainThreadSupport {
    pub fn new() -> (Self, MainThreadLoop) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let support = Self {
            thread: std::thread::current().id(),
            sender,
        };
        (support, MainThreadLoop { receiver })
    }
}

impl MainThreadSupport for ChannelMainThreadSupport {
    fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.thread
    }

    fn enqueue(&self, delivery: PendingDelivery) -> EventBusResult<()> {
        self.sender
            .send(delivery)
            .map_err(|_| EventBusError::Executor {
                message: "main thread loop has been dropped".to_string(),
            })
    }
}

/// Receiving end of [`ChannelMainThreadSupport`], drained on the main thread
pub struct MainThreadLoop {
    receiver: UnboundedReceiver<PendingDelivery>,
}

impl MainThreadLoop {
    /// Deliver everything queued so far; returns the number delivered
    pub fn run_pending(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(delivery) => {
                    deliver(delivery);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }

    /// Deliver until every sender is gone, for hosts running a current-thread runtime
    pub async fn run(mut self) {
        while let Some(delivery) = self.receiver.recv().await {
            deliver(delivery);
        }
    }
}

fn deliver(delivery: PendingDelivery) {
    if let Err(e) = delivery.deliver() {
        log_error_with_context(&e, "Main thread delivery failed");
    }
}
