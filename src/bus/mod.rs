//! In-process message bus
//!
//! Producers post messages; subscribers register handler methods tagged with
//! a message type, a thread mode and a priority. Each post reaches every
//! matching active handler in priority order, on the thread its mode asks
//! for.
//!
//! # Overview
//!
//! - **Hierarchy matching**: a message reaches handlers of its own type, its
//!   interfaces and its base types, each exactly once
//! - **Priorities**: higher first; equal priorities keep registration order
//! - **Thread modes**: inline, main thread, ordered main thread, a single
//!   background worker, or one executor job per delivery
//! - **Sticky messages**: the last message of each type is retained and
//!   replayed to sticky handlers when they register
//! - **Cancellation**: an inline handler may stop delivery to lower priority
//!   handlers of the current message
//!
//! # Architecture
//!
//! ```text
//! post ──► hierarchy ──► registry lookup ──► route by thread mode
//!                                              │
//!              ┌──────────────┬────────────────┼──────────────┐
//!              ▼              ▼                ▼              ▼
//!           inline     main thread loop   background     async job
//!                                           worker
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use msgbus::bus::api::{EventBus, Subscribe, SubscriberMethods};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Greeter {
//!     seen: Mutex<Vec<String>>,
//! }
//!
//! impl Subscribe for Greeter {
//!     fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
//!         methods.on::<String>("on_greeting", |greeter, text| {
//!             greeter.seen.lock().unwrap().push(text.clone());
//!             Ok(None)
//!         });
//!     }
//! }
//!
//! let bus = EventBus::new().unwrap();
//! let greeter = Arc::new(Greeter::default());
//! bus.register(&greeter).unwrap();
//! bus.post("hello".to_string()).unwrap();
//! assert_eq!(*greeter.seen.lock().unwrap(), vec!["hello"]);
//! ```

pub mod api;
#[allow(clippy::module_inception)]
pub mod bus;
pub mod builder;
pub mod error;
pub mod events;
pub mod executor;
pub mod finder;
pub mod hierarchy;
pub mod message;
pub mod poster;
mod posting;
mod registry;
mod sticky;
pub mod subscriber;
pub mod subscription;

#[cfg(test)]
mod tests;
