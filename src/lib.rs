pub mod app;
pub mod bus;
pub mod core;
pub mod util;

// Used by the subscriber_index! macro
#[doc(hidden)]
pub use inventory;
