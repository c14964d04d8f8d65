//! Public API for the message bus
//!
//! External modules should import from here rather than directly from internal modules.

// Bus and construction
pub use crate::bus::builder::{EventBusBuilder, EventBusConfig};
pub use crate::bus::bus::EventBus;

// Messages
pub use crate::bus::events::{NoSubscriberEvent, SubscriberExceptionEvent};
pub use crate::bus::message::{AnyMessage, AsAny, Envelope, Message, MessageKind, MessageType};

// Subscribers
pub use crate::bus::finder::{
    IndexedSubscriber, SimpleSubscriberInfoIndex, SubscriberInfoIndex, SubscriberMethodFinder,
};
pub use crate::bus::subscriber::{
    ErasedSubscriber, HandlerResult, MethodOptions, Subscribe, SubscriberMethod, SubscriberMethods,
    SubscriberRef, ThreadMode,
};
pub use crate::bus::subscription::Subscription;

// Execution and main thread support
pub use crate::bus::executor::{Executor, Job, ThreadExecutor, TokioExecutor};
pub use crate::bus::poster::main_thread::{
    ChannelMainThreadSupport, MainThreadLoop, MainThreadSupport, PendingDelivery,
};
pub use crate::bus::poster::queue::PendingPost;

// Error handling
pub use crate::bus::error::{EventBusError, EventBusResult, HandlerError, SubscriberFailure};
