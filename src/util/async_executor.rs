//! Run fallible work off-thread and report failures as messages
//!
//! ```no_run
//! use msgbus::bus::api::EventBus;
//! use msgbus::util::AsyncExecutor;
//!
//! let executor = AsyncExecutor::builder()
//!     .with_event_bus(EventBus::new().unwrap())
//!     .build_for_scope("sync")
//!     .unwrap();
//! executor
//!     .execute(|| {
//!         std::fs::read_to_string("/does/not/exist")?;
//!         Ok(())
//!     })
//!     .unwrap();
//! // Subscribers of ThrowableFailureEvent receive the io error with scope "sync"
//! ```

use crate::bus::api::{
    Envelope, EventBus, EventBusResult, HandlerError, Message, MessageKind,
};
use crate::core::error_handling::log_error_with_context;
use std::sync::Arc;

/// Message type posted when an executed job fails
pub trait FailureEvent: Message + Sized {
    fn from_failure(error: HandlerError, execution_scope: Option<String>) -> Self;
}

/// Default failure message
#[derive(Debug, Clone)]
pub struct ThrowableFailureEvent {
    pub error: Arc<HandlerError>,
    /// Tells receivers not to show error UI for this failure
    pub suppress_error_ui: bool,
    pub execution_scope: Option<String>,
}

impl ThrowableFailureEvent {
    pub fn new(error: HandlerError) -> Self {
        Self {
            error: Arc::new(error),
            suppress_error_ui: false,
            execution_scope: None,
        }
    }

    pub fn suppressed(mut self) -> Self {
        self.suppress_error_ui = true;
        self
    }
}

impl MessageKind for ThrowableFailureEvent {}
impl Message for ThrowableFailureEvent {}

impl FailureEvent for ThrowableFailureEvent {
    fn from_failure(error: HandlerError, execution_scope: Option<String>) -> Self {
        Self {
            execution_scope,
            ..Self::new(error)
        }
    }
}

type FailureFactory = fn(HandlerError, Option<String>) -> Envelope;

fn build_failure<E: FailureEvent>(error: HandlerError, scope: Option<String>) -> Envelope {
    Envelope::new(E::from_failure(error, scope))
}

pub struct AsyncExecutor {
    bus: EventBus,
    failure: FailureFactory,
    scope: Option<String>,
}

impl AsyncExecutor {
    pub fn builder() -> AsyncExecutorBuilder {
        AsyncExecutorBuilder::default()
    }

    /// Executor on the default bus posting [`ThrowableFailureEvent`]s
    pub fn create() -> EventBusResult<Self> {
        Self::builder().build()
    }

    /// Run `job` on the bus executor; an `Err` is posted as a failure message
    pub fn execute<F>(&self, job: F) -> EventBusResult<()>
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        let bus = self.bus.clone();
        let failure = self.failure;
        let scope = self.scope.clone();
        self.bus.executor().execute(Box::new(move || {
            if let Err(error) = job() {
                log::debug!("Executed job failed: {}", error);
                if let Err(e) = bus.post_envelope(failure(error, scope)) {
                    log_error_with_context(&e, "Posting failure message");
                }
            }
        }))
    }
}

#[derive(Default)]
pub struct AsyncExecutorBuilder {
    bus: Option<EventBus>,
    failure: Option<FailureFactory>,
}

impl AsyncExecutorBuilder {
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Post `E` instead of [`ThrowableFailureEvent`] on failure
    pub fn with_failure_event<E: FailureEvent>(mut self) -> Self {
        self.failure = Some(build_failure::<E>);
        self
    }

    pub fn build(self) -> EventBusResult<AsyncExecutor> {
        self.build_with(None)
    }

    /// Failure messages carry `scope` so receivers can tell callers apart
    pub fn build_for_scope(self, scope: impl Into<String>) -> EventBusResult<AsyncExecutor> {
        self.build_with(Some(scope.into()))
    }

    fn build_with(self, scope: Option<String>) -> EventBusResult<AsyncExecutor> {
        let bus = match self.bus {
            Some(bus) => bus,
            None => EventBus::get_default()?,
        };
        Ok(AsyncExecutor {
            bus,
            failure: self
                .failure
                .unwrap_or(build_failure::<ThrowableFailureEvent>),
            scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::api::{Subscribe, SubscriberMethods};
    use std::sync::mpsc::{channel, Sender};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct CustomFailure {
        text: String,
    }
    impl MessageKind for CustomFailure {}
    impl Message for CustomFailure {}
    impl FailureEvent for CustomFailure {
        fn from_failure(error: HandlerError, scope: Option<String>) -> Self {
            Self {
                text: format!("{}: {}", scope.unwrap_or_default(), error),
            }
        }
    }

    struct Watcher {
        sender: Mutex<Sender<String>>,
    }

    impl Subscribe for Watcher {
        fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
            methods.on::<ThrowableFailureEvent>("on_failure", |watcher, failure| {
                let text = format!(
                    "{}|{}",
                    failure.execution_scope.clone().unwrap_or_default(),
                    failure.error
                );
                watcher.sender.lock().unwrap().send(text).unwrap();
                Ok(None)
            });
            methods.on::<CustomFailure>("on_custom", |watcher, failure| {
                watcher.sender.lock().unwrap().send(failure.text.clone()).unwrap();
                Ok(None)
            });
        }
    }

    fn watched_bus() -> (EventBus, Arc<Watcher>, std::sync::mpsc::Receiver<String>) {
        let bus = EventBus::new().unwrap();
        let (sender, receiver) = channel();
        let watcher = Arc::new(Watcher {
            sender: Mutex::new(sender),
        });
        bus.register(&watcher).unwrap();
        (bus, watcher, receiver)
    }

    #[test]
    fn test_failure_is_posted_with_scope() {
        let (bus, _watcher, receiver) = watched_bus();
        let executor = AsyncExecutor::builder()
            .with_event_bus(bus)
            .build_for_scope("import")
            .unwrap();

        executor.execute(|| Err("disk full".into())).unwrap();

        let text = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(text, "import|disk full");
    }

    #[test]
    fn test_success_posts_nothing() {
        let (bus, _watcher, receiver) = watched_bus();
        let executor = AsyncExecutor::builder().with_event_bus(bus).build().unwrap();

        executor.execute(|| Ok(())).unwrap();

        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_custom_failure_event() {
        let (bus, _watcher, receiver) = watched_bus();
        let executor = AsyncExecutor::builder()
            .with_event_bus(bus)
            .with_failure_event::<CustomFailure>()
            .build_for_scope("sync")
            .unwrap();

        executor.execute(|| Err("timeout".into())).unwrap();

        let text = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(text, "sync: timeout");
    }
}
