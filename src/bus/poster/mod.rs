//! Deferred delivery: background and async queues plus main thread support

pub(crate) mod async_poster;
pub(crate) mod background;
pub mod main_thread;
pub mod queue;
