//! Error reporting where errors cannot be returned
//!
//! Worker jobs and main thread deliveries have no caller to hand an error
//! to, so they log it. Usage errors are logged with their actionable
//! message; engine faults get the operation context and detail at debug level.

/// Errors that know whether the user can fix them
///
/// When `is_user_actionable()` is true, `user_message()` should return `Some`.
pub trait ContextualError: std::error::Error {
    /// True for misuse of the API, false for faults inside the engine
    fn is_user_actionable(&self) -> bool;

    fn user_message(&self) -> Option<&str>;
}

/// Log an error at the level of detail its kind deserves
///
/// ```rust
/// use msgbus::bus::api::EventBusError;
/// use msgbus::core::error_handling::log_error_with_context;
///
/// // Logs "FATAL: Async delivery failed" plus debug detail
/// log_error_with_context(&EventBusError::NoPendingPost { poster: "async" }, "Async delivery failed");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message().filter(|_| error.is_user_actionable()) {
        Some(user_msg) => log::error!("FATAL: {} ({})", user_msg, operation_context),
        None => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::error::EventBusError;
    use crate::bus::subscriber::ThreadMode;

    #[test]
    fn test_usage_errors_carry_user_message() {
        let errors = [
            EventBusError::NotPosting,
            EventBusError::NotCurrentMessage,
            EventBusError::CancelFromNonPostingMode {
                thread_mode: ThreadMode::Async,
            },
            EventBusError::DuplicateSubscription {
                subscriber: "Widget",
                message_type: "String",
            },
            EventBusError::Config {
                message: "bad key".to_string(),
            },
        ];
        for error in &errors {
            assert!(error.is_user_actionable(), "{error:?}");
            assert!(error.user_message().is_some(), "{error:?}");
        }
    }

    #[test]
    fn test_engine_faults_have_no_user_message() {
        let errors = [
            EventBusError::AbortStateNotReset,
            EventBusError::NoPendingPost { poster: "async" },
            EventBusError::Synchronisation {
                message: "poisoned".to_string(),
            },
        ];
        for error in &errors {
            assert!(!error.is_user_actionable(), "{error:?}");
            assert_eq!(error.user_message(), None);
        }
    }

    #[test]
    fn test_logging_does_not_panic_without_logger() {
        log_error_with_context(&EventBusError::AbortStateNotReset, "Posting");
    }
}
