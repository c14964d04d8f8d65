//! Messages the bus posts about itself

use crate::bus::error::SubscriberFailure;
use crate::bus::message::{Envelope, Message, MessageKind};
use crate::bus::subscriber::SubscriberRef;
use std::sync::Arc;

/// Posted when a message found no subscriber at all
#[derive(Debug, Clone)]
pub struct NoSubscriberEvent {
    pub original_message: Envelope,
}

impl MessageKind for NoSubscriberEvent {}
impl Message for NoSubscriberEvent {}

/// Posted when a handler fails, unless the failing message was itself one of these
#[derive(Debug, Clone)]
pub struct SubscriberExceptionEvent {
    pub cause: Arc<SubscriberFailure>,
    pub original_message: Envelope,
    pub subscriber: SubscriberRef,
}

impl MessageKind for SubscriberExceptionEvent {}
impl Message for SubscriberExceptionEvent {}

/// True for messages the bus never reports as unhandled
pub(crate) fn is_bus_event(envelope: &Envelope) -> bool {
    envelope.is::<NoSubscriberEvent>() || envelope.is::<SubscriberExceptionEvent>()
}
