//! Helpers built on top of the bus

pub mod async_executor;

pub use async_executor::{AsyncExecutor, AsyncExecutorBuilder, FailureEvent, ThrowableFailureEvent};
