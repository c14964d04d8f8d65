//! Common test utilities and helpers
//!
//! Shared subscribers and waiting helpers for the integration suites.

#![allow(dead_code)]

use msgbus::bus::api::{EventBus, Subscribe, SubscriberMethods};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Collects every `String` it receives
#[derive(Default)]
pub struct Recorder {
    received: Mutex<Vec<String>>,
    changed: Condvar,
}

impl Recorder {
    pub fn push(&self, entry: impl Into<String>) {
        self.received.lock().unwrap().push(entry.into());
        self.changed.notify_all();
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn wait_for(&self, count: usize) -> Vec<String> {
        let received = self.received.lock().unwrap();
        let (received, _) = self
            .changed
            .wait_timeout_while(received, WAIT, |r| r.len() < count)
            .unwrap();
        received.clone()
    }
}

impl Subscribe for Recorder {
    fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
        methods.on::<String>("on_text", |recorder, text| {
            recorder.push(text.clone());
            Ok(None)
        });
    }
}

/// A fresh bus with a registered [`Recorder`]
pub fn bus_with_recorder() -> (EventBus, Arc<Recorder>) {
    let bus = EventBus::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    bus.register(&recorder).unwrap();
    (bus, recorder)
}
