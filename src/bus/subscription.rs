//! A subscriber bound to one of its methods

use crate::bus::message::Envelope;
use crate::bus::subscriber::{HandlerResult, SubscriberMethod, SubscriberRef};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Live binding of a subscriber instance to one handler method
///
/// `active` starts true and is cleared exactly once, at unregister. Queued
/// deliveries check it immediately before invoking.
pub struct Subscription {
    subscriber: SubscriberRef,
    method: SubscriberMethod,
    active: AtomicBool,
}

impl Subscription {
    pub fn new(subscriber: SubscriberRef, method: SubscriberMethod) -> Self {
        Self {
            subscriber,
            method,
            active: AtomicBool::new(true),
        }
    }

    pub fn subscriber(&self) -> &SubscriberRef {
        &self.subscriber
    }

    pub fn method(&self) -> &SubscriberMethod {
        &self.method
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn invoke(&self, envelope: &Envelope) -> HandlerResult {
        self.method.invoke(self.subscriber.instance(), envelope)
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.subscriber == other.subscriber && self.method.method_key() == other.method.method_key()
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber", &self.subscriber)
            .field("method", &self.method.method_key())
            .field("active", &self.is_active())
            .finish()
    }
}
