//! Last-value store for sticky messages

use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::message::{Envelope, Message, MessageType};
use crate::core::sync::handle_mutex_poison;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One retained message per concrete type, last write wins
///
/// Entries carry a sequence number so replay order follows post order.
#[derive(Default)]
pub(crate) struct StickyStore {
    entries: Mutex<HashMap<MessageType, (u64, Envelope)>>,
    sequence: AtomicU64,
}

impl StickyStore {
    fn lock(&self) -> EventBusResult<MutexGuard<'_, HashMap<MessageType, (u64, Envelope)>>> {
        handle_mutex_poison(self.entries.lock(), |message| {
            EventBusError::Synchronisation { message }
        })
    }

    pub fn put(&self, envelope: Envelope) -> EventBusResult<()> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.lock()?.insert(envelope.message_type(), (seq, envelope));
        Ok(())
    }

    pub fn get(&self, message_type: &MessageType) -> EventBusResult<Option<Envelope>> {
        Ok(self
            .lock()?
            .get(message_type)
            .map(|(_, envelope)| envelope.clone()))
    }

    pub fn remove(&self, message_type: &MessageType) -> EventBusResult<Option<Envelope>> {
        Ok(self.lock()?.remove(message_type).map(|(_, envelope)| envelope))
    }

    /// Remove the retained `T` if it equals `value`
    pub fn remove_equal<T: Message + PartialEq>(&self, value: &T) -> EventBusResult<bool> {
        let message_type = MessageType::of::<T>();
        let mut entries = self.lock()?;
        let matches = entries
            .get(&message_type)
            .and_then(|(_, stored)| stored.downcast_ref::<T>())
            .is_some_and(|stored| stored == value);
        if matches {
            entries.remove(&message_type);
        }
        Ok(matches)
    }

    /// Remove the retained message only if it is this very envelope
    pub fn remove_same(&self, envelope: &Envelope) -> EventBusResult<bool> {
        let message_type = envelope.message_type();
        let mut entries = self.lock()?;
        let matches = entries
            .get(&message_type)
            .is_some_and(|(_, stored)| stored.ptr_eq(envelope));
        if matches {
            entries.remove(&message_type);
        }
        Ok(matches)
    }

    pub fn clear(&self) -> EventBusResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Every retained message, oldest post first
    pub fn snapshot(&self) -> EventBusResult<Vec<Envelope>> {
        let entries = self.lock()?;
        let mut ordered: Vec<&(u64, Envelope)> = entries.values().collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        Ok(ordered.into_iter().map(|(_, envelope)| envelope.clone()).collect())
    }
}
