//! Error types for the message bus

use crate::bus::subscriber::ThreadMode;
use std::fmt;
use std::sync::Arc;

/// Error returned by a handler body
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the bus itself
///
/// Handler failures are contained by default and only surface here as
/// [`EventBusError::SubscriberFailed`] when throw-on-subscriber-exception is enabled.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Subscriber {subscriber} is already registered to message {message_type}")]
    DuplicateSubscription {
        subscriber: &'static str,
        message_type: &'static str,
    },

    #[error("Type {subscriber_type} and its parents declare no subscriber methods")]
    NoSubscriberMethods { subscriber_type: &'static str },

    #[error("{subscriber_type}.{method} is an illegal subscriber method: {reason}")]
    IllegalSubscriberMethod {
        subscriber_type: &'static str,
        method: String,
        reason: String,
    },

    #[error("This method may only be called from inside message handling methods on the posting thread")]
    NotPosting,

    #[error("Only the currently handled message may be aborted")]
    NotCurrentMessage,

    #[error("Only handlers in Posting mode may abort the incoming message (handler mode: {thread_mode})")]
    CancelFromNonPostingMode { thread_mode: ThreadMode },

    #[error("Internal error. Abort state was not reset")]
    AbortStateNotReset,

    #[error("Invoking subscriber {subscriber} for message {message_type} failed")]
    SubscriberFailed {
        subscriber: &'static str,
        message_type: &'static str,
        #[source]
        cause: Arc<SubscriberFailure>,
    },

    #[error("No pending post available in the {poster} queue")]
    NoPendingPost { poster: &'static str },

    #[error("Default EventBus instance already exists")]
    DefaultAlreadyInstalled,

    #[error("Executor unavailable: {message}")]
    Executor { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("{message}")]
    Synchronisation { message: String },
}

/// Result type for bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

impl crate::core::error_handling::ContextualError for EventBusError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            EventBusError::DuplicateSubscription { .. }
                | EventBusError::NoSubscriberMethods { .. }
                | EventBusError::IllegalSubscriberMethod { .. }
                | EventBusError::NotPosting
                | EventBusError::NotCurrentMessage
                | EventBusError::CancelFromNonPostingMode { .. }
                | EventBusError::DefaultAlreadyInstalled
                | EventBusError::Config { .. }
        )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            EventBusError::NotPosting => {
                Some("cancel_event_delivery must be called from a handler on the posting thread")
            }
            EventBusError::NotCurrentMessage => {
                Some("cancel_event_delivery was given a message other than the one being handled")
            }
            EventBusError::CancelFromNonPostingMode { .. } => {
                Some("only Posting mode handlers may cancel delivery")
            }
            EventBusError::DuplicateSubscription { .. } => {
                Some("subscriber registered twice for the same message type")
            }
            EventBusError::NoSubscriberMethods { .. } => {
                Some("subscriber type declares no subscriber methods")
            }
            EventBusError::IllegalSubscriberMethod { .. } => {
                Some("subscriber type declares an illegal subscriber method")
            }
            EventBusError::DefaultAlreadyInstalled => {
                Some("a default EventBus is already installed")
            }
            EventBusError::Config { message } => Some(message),
            _ => None,
        }
    }
}

/// What went wrong inside a handler body
#[derive(Debug)]
pub enum SubscriberFailure {
    /// The handler returned an error
    Error(HandlerError),
    /// The handler panicked; holds the panic payload text when it was a string
    Panicked(String),
}

impl SubscriberFailure {
    /// Build from a payload returned by `catch_unwind`
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        SubscriberFailure::Panicked(text)
    }
}

impl fmt::Display for SubscriberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberFailure::Error(err) => write!(f, "{err}"),
            SubscriberFailure::Panicked(text) => write!(f, "handler panicked: {text}"),
        }
    }
}

impl std::error::Error for SubscriberFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubscriberFailure::Error(err) => Some(err.as_ref()),
            SubscriberFailure::Panicked(_) => None,
        }
    }
}
