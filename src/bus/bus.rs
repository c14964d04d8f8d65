//! The dispatch engine
//!
//! A post walks the message's type hierarchy, looks up the subscriptions for
//! each type and routes every one of them by thread mode. Posting is
//! re-entrant: a post made from inside a handler on the same thread is queued
//! behind the message being delivered instead of recursing.

use crate::bus::builder::{self, EventBusBuilder, EventBusConfig};
use crate::bus::error::{EventBusError, EventBusResult, SubscriberFailure};
use crate::bus::events::{is_bus_event, NoSubscriberEvent, SubscriberExceptionEvent};
use crate::bus::executor::Executor;
use crate::bus::finder::{self, SubscriberMethodFinder};
use crate::bus::hierarchy;
use crate::bus::message::{Envelope, Message, MessageKind, MessageType};
use crate::bus::posting::{self, with_state, PostingReset};
use crate::bus::poster::async_poster::AsyncPoster;
use crate::bus::poster::background::BackgroundPoster;
use crate::bus::poster::main_thread::{MainThreadSupport, PendingDelivery};
use crate::bus::poster::queue::PendingPost;
use crate::bus::registry::SubscriptionRegistry;
use crate::bus::sticky::StickyStore;
use crate::bus::subscriber::{identity, Subscribe, SubscriberRef, ThreadMode};
use crate::bus::subscription::Subscription;
use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct BusCore {
    id: u64,
    config: EventBusConfig,
    finder: SubscriberMethodFinder,
    registry: RwLock<SubscriptionRegistry>,
    sticky: StickyStore,
    executor: Arc<dyn Executor>,
    main_thread_support: Option<Arc<dyn MainThreadSupport>>,
    background: BackgroundPoster,
    async_poster: AsyncPoster,
}

impl BusCore {
    pub fn new(
        config: EventBusConfig,
        finder: SubscriberMethodFinder,
        executor: Arc<dyn Executor>,
        main_thread_support: Option<Arc<dyn MainThreadSupport>>,
    ) -> Self {
        let background = BackgroundPoster::new(config.background_poll_timeout());
        Self {
            id: posting::next_bus_id(),
            config,
            finder,
            registry: RwLock::new(SubscriptionRegistry::default()),
            sticky: StickyStore::default(),
            executor,
            main_thread_support,
            background,
            async_poster: AsyncPoster::default(),
        }
    }
}

/// In-process publish/subscribe bus
///
/// Cloning is cheap; clones share one bus.
#[derive(Clone)]
pub struct EventBus {
    core: Arc<BusCore>,
}

impl EventBus {
    pub(crate) fn from_core(core: BusCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// A bus with default settings
    pub fn new() -> EventBusResult<Self> {
        EventBusBuilder::new().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// The process-wide default bus, created on first use
    pub fn get_default() -> EventBusResult<Self> {
        builder::default_bus()
    }

    /// Forget the default bus; the next [`EventBus::get_default`] builds a new one
    pub fn clear_default() -> EventBusResult<()> {
        builder::clear_default_bus()
    }

    /// Drop the process-wide hierarchy and subscriber method caches
    pub fn clear_caches() -> EventBusResult<()> {
        finder::clear_cache()?;
        hierarchy::clear_cache()
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.core.config
    }

    pub(crate) fn executor(&self) -> &Arc<dyn Executor> {
        &self.core.executor
    }

    pub(crate) fn background_poster(&self) -> &BackgroundPoster {
        &self.core.background
    }

    pub(crate) fn async_poster(&self) -> &AsyncPoster {
        &self.core.async_poster
    }

    fn registry_read(&self) -> EventBusResult<RwLockReadGuard<'_, SubscriptionRegistry>> {
        handle_rwlock_read(self.core.registry.read(), |message| {
            EventBusError::Synchronisation { message }
        })
    }

    fn registry_write(&self) -> EventBusResult<RwLockWriteGuard<'_, SubscriptionRegistry>> {
        handle_rwlock_write(self.core.registry.write(), |message| {
            EventBusError::Synchronisation { message }
        })
    }

    fn is_main_thread(&self) -> bool {
        self.core
            .main_thread_support
            .as_ref()
            .map_or(true, |support| support.is_main_thread())
    }

    /// Types a message of `message_type` is delivered as
    fn matching_types(&self, message_type: MessageType) -> EventBusResult<Arc<[MessageType]>> {
        if self.core.config.event_inheritance {
            hierarchy::resolve(message_type)
        } else {
            Ok(vec![message_type].into())
        }
    }

    /// Subscribe every handler method `S` declares
    ///
    /// Sticky handlers receive matching retained messages before this returns.
    pub fn register<S: Subscribe>(&self, subscriber: &Arc<S>) -> EventBusResult<()> {
        let methods = self.core.finder.find::<S>()?;
        let subscriber = SubscriberRef::new(subscriber);

        let sticky_deliveries = {
            let mut registry = self.registry_write()?;
            let subscriptions = registry.subscribe_all(&subscriber, &methods)?;
            self.sticky_deliveries(&subscriptions)?
        };
        log::trace!(
            "Registered {} with {} subscriber methods",
            subscriber.type_name(),
            methods.len()
        );

        // Delivered outside the registry lock so handlers may use the bus
        let is_main_thread = self.is_main_thread();
        for (subscription, envelope) in sticky_deliveries {
            self.post_to_subscription(&subscription, &envelope, is_main_thread)?;
        }
        Ok(())
    }

    fn sticky_deliveries(
        &self,
        subscriptions: &[Arc<Subscription>],
    ) -> EventBusResult<Vec<(Arc<Subscription>, Envelope)>> {
        let mut deliveries = Vec::new();
        if !subscriptions.iter().any(|s| s.method().is_sticky()) {
            return Ok(deliveries);
        }

        let retained = self.core.sticky.snapshot()?;
        for subscription in subscriptions.iter().filter(|s| s.method().is_sticky()) {
            let wanted = subscription.method().message_type();
            for envelope in &retained {
                if self.matching_types(envelope.message_type())?.contains(&wanted) {
                    deliveries.push((Arc::clone(subscription), envelope.clone()));
                }
            }
        }
        Ok(deliveries)
    }

    /// Remove every subscription of the subscriber
    ///
    /// Queued deliveries to it are dropped when they reach the front. An
    /// unknown subscriber is logged, not an error.
    pub fn unregister<S: Any + Send + Sync>(&self, subscriber: &Arc<S>) -> EventBusResult<()> {
        let removed = self.registry_write()?.unsubscribe(identity(subscriber));
        match removed {
            Some(count) => log::trace!(
                "Unregistered {} ({} subscriptions)",
                std::any::type_name::<S>(),
                count
            ),
            None => log::warn!(
                "Subscriber to unregister was not registered before: {}",
                std::any::type_name::<S>()
            ),
        }
        Ok(())
    }

    pub fn is_registered<S: Any + Send + Sync>(&self, subscriber: &Arc<S>) -> EventBusResult<bool> {
        Ok(self.registry_read()?.is_registered(identity(subscriber)))
    }

    /// Whether a post of `K` would reach at least one subscription
    pub fn has_subscriber_for<K: MessageKind>(&self) -> EventBusResult<bool> {
        self.has_subscriber_for_type(MessageType::of::<K>())
    }

    pub fn has_subscriber_for_type(&self, message_type: MessageType) -> EventBusResult<bool> {
        let types = self.matching_types(message_type)?;
        let registry = self.registry_read()?;
        Ok(types.iter().any(|ty| registry.has_subscriptions(ty)))
    }

    pub fn post<T: Message>(&self, message: T) -> EventBusResult<()> {
        self.post_envelope(Envelope::new(message))
    }

    /// Post an already wrapped message, keeping its identity
    pub fn post_envelope(&self, envelope: Envelope) -> EventBusResult<()> {
        self.post_all([envelope])
    }

    /// Queue every message before delivery starts, then deliver them in order
    ///
    /// From inside a handler the whole batch lands behind the message being
    /// delivered.
    pub fn post_all(&self, envelopes: impl IntoIterator<Item = Envelope>) -> EventBusResult<()> {
        // Collected first so the iterator never runs while the state is borrowed
        let envelopes: Vec<Envelope> = envelopes.into_iter().collect();
        let bus_id = self.core.id;
        let is_main_thread = self.is_main_thread();

        let top_level = with_state(bus_id, |state| {
            if !state.is_posting && state.canceled {
                return Err(EventBusError::AbortStateNotReset);
            }
            state.queue.extend(envelopes);
            if state.is_posting {
                return Ok(false);
            }
            state.is_posting = true;
            state.is_main_thread = is_main_thread;
            Ok(true)
        })?;
        if !top_level {
            return Ok(());
        }

        let _reset = PostingReset::new(bus_id);
        while let Some(next) = with_state(bus_id, |state| state.queue.pop_front()) {
            self.post_single(&next)?;
        }
        Ok(())
    }

    fn post_single(&self, envelope: &Envelope) -> EventBusResult<()> {
        let message_type = envelope.message_type();
        let mut found = false;
        for ty in self.matching_types(message_type)?.iter() {
            found |= self.post_for_type(envelope, ty)?;
        }

        if !found {
            if self.core.config.log_no_subscriber_messages {
                log::debug!("No subscribers registered for message {}", message_type);
            }
            if self.core.config.send_no_subscriber_event && !is_bus_event(envelope) {
                self.post(NoSubscriberEvent {
                    original_message: envelope.clone(),
                })?;
            }
        }
        Ok(())
    }

    /// Deliver to the subscriptions of one type; false when there were none
    fn post_for_type(&self, envelope: &Envelope, message_type: &MessageType) -> EventBusResult<bool> {
        let subscriptions = self.registry_read()?.lookup(message_type);
        if subscriptions.is_empty() {
            return Ok(false);
        }

        let bus_id = self.core.id;
        for subscription in subscriptions {
            let is_main_thread = with_state(bus_id, |state| {
                state.current = Some((envelope.clone(), Arc::clone(&subscription)));
                state.is_main_thread
            });
            let result = self.post_to_subscription(&subscription, envelope, is_main_thread);
            let aborted = with_state(bus_id, |state| {
                state.current = None;
                std::mem::take(&mut state.canceled)
            });
            result?;
            if aborted {
                break;
            }
        }
        Ok(true)
    }

    fn post_to_subscription(
        &self,
        subscription: &Arc<Subscription>,
        envelope: &Envelope,
        is_main_thread: bool,
    ) -> EventBusResult<()> {
        let main_thread_support = self.core.main_thread_support.as_ref();
        match subscription.method().thread_mode() {
            ThreadMode::Posting => self.invoke_subscriber(subscription, envelope),
            ThreadMode::Main => match main_thread_support {
                Some(support) if !is_main_thread => {
                    support.enqueue(self.pending_delivery(subscription, envelope))
                }
                _ => self.invoke_subscriber(subscription, envelope),
            },
            ThreadMode::MainOrdered => match main_thread_support {
                Some(support) => support.enqueue(self.pending_delivery(subscription, envelope)),
                None => self.invoke_subscriber(subscription, envelope),
            },
            ThreadMode::Background => {
                if is_main_thread {
                    self.core.background.enqueue(self, pending(subscription, envelope))
                } else {
                    self.invoke_subscriber(subscription, envelope)
                }
            }
            ThreadMode::Async => self
                .core
                .async_poster
                .enqueue(self, pending(subscription, envelope)),
        }
    }

    fn pending_delivery(&self, subscription: &Arc<Subscription>, envelope: &Envelope) -> PendingDelivery {
        PendingDelivery::new(self.clone(), pending(subscription, envelope))
    }

    /// Deliver a queued post; skipped when the subscription went inactive
    pub(crate) fn invoke_pending(&self, post: PendingPost) -> EventBusResult<()> {
        self.invoke_subscriber(&post.subscription, &post.envelope)
    }

    fn invoke_subscriber(&self, subscription: &Subscription, envelope: &Envelope) -> EventBusResult<()> {
        if !subscription.is_active() {
            return Ok(());
        }
        match catch_unwind(AssertUnwindSafe(|| subscription.invoke(envelope))) {
            Ok(Ok(Some(reply))) => self.post_envelope(reply),
            Ok(Ok(None)) => Ok(()),
            Ok(Err(error)) => {
                self.handle_subscriber_failure(subscription, envelope, SubscriberFailure::Error(error))
            }
            Err(payload) => self.handle_subscriber_failure(
                subscription,
                envelope,
                SubscriberFailure::from_panic(payload),
            ),
        }
    }

    fn handle_subscriber_failure(
        &self,
        subscription: &Subscription,
        envelope: &Envelope,
        failure: SubscriberFailure,
    ) -> EventBusResult<()> {
        let config = &self.core.config;
        let subscriber = subscription.subscriber();

        if let Some(event) = envelope.downcast_ref::<SubscriberExceptionEvent>() {
            // Reporting a failure must not produce another report
            if config.log_subscriber_exceptions {
                log::error!(
                    "SubscriberExceptionEvent subscriber {} failed: {}",
                    subscriber.type_name(),
                    failure
                );
                log::error!(
                    "Initial message {:?} caused exception in {:?}: {}",
                    event.original_message,
                    event.subscriber,
                    event.cause
                );
            }
            return Ok(());
        }

        let cause = Arc::new(failure);
        if config.throw_subscriber_exception {
            return Err(EventBusError::SubscriberFailed {
                subscriber: subscriber.type_name(),
                message_type: envelope.message_type().name(),
                cause,
            });
        }
        if config.log_subscriber_exceptions {
            log::error!(
                "Could not dispatch message {} to subscriber {}: {}",
                envelope.message_type(),
                subscriber.type_name(),
                cause
            );
        }
        if config.send_subscriber_exception_event {
            self.post(SubscriberExceptionEvent {
                cause,
                original_message: envelope.clone(),
                subscriber: subscriber.clone(),
            })?;
        }
        Ok(())
    }

    /// Stop the current message from reaching lower priority handlers
    ///
    /// Only valid from a [`ThreadMode::Posting`] handler, for the message it
    /// is handling (the typed value it received, or its envelope). Delivery to
    /// the remaining handlers of the current type pass is skipped.
    pub fn cancel_event_delivery<T: Any>(&self, message: &T) -> EventBusResult<()> {
        with_state(self.core.id, |state| {
            if !state.is_posting {
                return Err(EventBusError::NotPosting);
            }
            let Some((current, subscription)) = state.current.as_ref() else {
                return Err(EventBusError::NotCurrentMessage);
            };
            if !current.holds(message) {
                return Err(EventBusError::NotCurrentMessage);
            }
            let thread_mode = subscription.method().thread_mode();
            if thread_mode != ThreadMode::Posting {
                return Err(EventBusError::CancelFromNonPostingMode { thread_mode });
            }
            state.canceled = true;
            Ok(())
        })
    }

    /// Retain the message as the latest of its type, then post it
    pub fn post_sticky<T: Message>(&self, message: T) -> EventBusResult<()> {
        self.post_sticky_envelope(Envelope::new(message))
    }

    pub fn post_sticky_envelope(&self, envelope: Envelope) -> EventBusResult<()> {
        self.core.sticky.put(envelope.clone())?;
        self.post_envelope(envelope)
    }

    pub fn get_sticky<T: Message>(&self) -> EventBusResult<Option<Arc<T>>> {
        Ok(self
            .core
            .sticky
            .get(&MessageType::of::<T>())?
            .and_then(|envelope| envelope.downcast_arc::<T>()))
    }

    pub fn get_sticky_envelope(&self, message_type: MessageType) -> EventBusResult<Option<Envelope>> {
        self.core.sticky.get(&message_type)
    }

    /// Remove and return the retained message of type `T`
    pub fn remove_sticky<T: Message>(&self) -> EventBusResult<Option<Arc<T>>> {
        Ok(self
            .core
            .sticky
            .remove(&MessageType::of::<T>())?
            .and_then(|envelope| envelope.downcast_arc::<T>()))
    }

    /// Remove the retained message of type `T` only if it equals `message`
    pub fn remove_sticky_message<T: Message + PartialEq>(&self, message: &T) -> EventBusResult<bool> {
        self.core.sticky.remove_equal(message)
    }

    /// Remove the retained message only if it is this very envelope
    pub fn remove_sticky_envelope(&self, envelope: &Envelope) -> EventBusResult<bool> {
        self.core.sticky.remove_same(envelope)
    }

    pub fn remove_all_sticky(&self) -> EventBusResult<()> {
        self.core.sticky.clear()
    }
}

fn pending(subscription: &Arc<Subscription>, envelope: &Envelope) -> PendingPost {
    PendingPost::new(Arc::clone(subscription), envelope.clone())
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.core.id)
            .field("event_inheritance", &self.core.config.event_inheritance)
            .finish()
    }
}
