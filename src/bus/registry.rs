//! Subscription registry
//!
//! Two maps kept consistent with each other: message type to the ordered
//! subscriptions for it, and subscriber to the types it is registered for.
//! The bus keeps the registry behind a single `RwLock`.

use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::message::MessageType;
use crate::bus::subscriber::{SubscriberMethod, SubscriberRef};
use crate::bus::subscription::Subscription;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    by_type: HashMap<MessageType, Vec<Arc<Subscription>>>,
    types_by_subscriber: HashMap<usize, Vec<MessageType>>,
}

impl SubscriptionRegistry {
    /// Subscribe every method of one subscriber, or none of them
    pub fn subscribe_all(
        &mut self,
        subscriber: &SubscriberRef,
        methods: &[SubscriberMethod],
    ) -> EventBusResult<Vec<Arc<Subscription>>> {
        let subscriptions: Vec<Arc<Subscription>> = methods
            .iter()
            .map(|method| Arc::new(Subscription::new(subscriber.clone(), method.clone())))
            .collect();

        for subscription in &subscriptions {
            let message_type = subscription.method().message_type();
            let duplicate = self
                .by_type
                .get(&message_type)
                .is_some_and(|existing| existing.iter().any(|s| **s == **subscription));
            if duplicate {
                return Err(EventBusError::DuplicateSubscription {
                    subscriber: subscriber.type_name(),
                    message_type: message_type.name(),
                });
            }
        }

        for subscription in &subscriptions {
            self.insert(Arc::clone(subscription));
        }
        Ok(subscriptions)
    }

    fn insert(&mut self, subscription: Arc<Subscription>) {
        let message_type = subscription.method().message_type();
        let priority = subscription.method().priority();

        let list = self.by_type.entry(message_type).or_default();
        // Before the first strictly lower priority keeps equal priorities in registration order
        let position = list
            .iter()
            .position(|existing| existing.method().priority() < priority)
            .unwrap_or(list.len());
        list.insert(position, Arc::clone(&subscription));

        let types = self
            .types_by_subscriber
            .entry(subscription.subscriber().id())
            .or_default();
        if !types.contains(&message_type) {
            types.push(message_type);
        }
    }

    /// Deactivate and remove every subscription of a subscriber
    ///
    /// Returns `None` when the subscriber was not registered.
    pub fn unsubscribe(&mut self, subscriber_id: usize) -> Option<usize> {
        let types = self.types_by_subscriber.remove(&subscriber_id)?;
        let mut removed = 0;

        for message_type in types {
            if let Some(list) = self.by_type.get_mut(&message_type) {
                list.retain(|subscription| {
                    if subscription.subscriber().id() == subscriber_id {
                        subscription.deactivate();
                        removed += 1;
                        false
                    } else {
                        true
                    }
                });
                if list.is_empty() {
                    self.by_type.remove(&message_type);
                }
            }
        }
        Some(removed)
    }

    /// Snapshot of the subscriptions for one type, in delivery order
    pub fn lookup(&self, message_type: &MessageType) -> Vec<Arc<Subscription>> {
        self.by_type
            .get(message_type)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    pub fn has_subscriptions(&self, message_type: &MessageType) -> bool {
        self.by_type
            .get(message_type)
            .is_some_and(|list| !list.is_empty())
    }

    pub fn is_registered(&self, subscriber_id: usize) -> bool {
        self.types_by_subscriber.contains_key(&subscriber_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::subscriber::{Subscribe, SubscriberMethods};

    struct Ranked;
    impl Subscribe for Ranked {
        fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
            methods.on::<String>("low", |_, _| Ok(None)).priority(1);
            methods.on::<String>("high", |_, _| Ok(None)).priority(10);
            methods.on::<i32>("number", |_, _| Ok(None));
        }
    }

    struct Plain;
    impl Subscribe for Plain {
        fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
            methods.on::<String>("first", |_, _| Ok(None)).priority(1);
        }
    }

    fn methods_of<S: Subscribe>() -> Vec<SubscriberMethod> {
        SubscriberMethods::<S>::collect(S::subscriber_methods)
    }

    fn names(subscriptions: &[Arc<Subscription>]) -> Vec<&'static str> {
        subscriptions.iter().map(|s| s.method().name()).collect()
    }

    #[test]
    fn test_subscribe_orders_by_priority_then_registration() {
        let mut registry = SubscriptionRegistry::default();
        let ranked = SubscriberRef::new(&Arc::new(Ranked));
        let plain = SubscriberRef::new(&Arc::new(Plain));

        registry.subscribe_all(&ranked, &methods_of::<Ranked>()).unwrap();
        registry.subscribe_all(&plain, &methods_of::<Plain>()).unwrap();

        let text = registry.lookup(&MessageType::of::<String>());
        assert_eq!(names(&text), vec!["high", "low", "first"]);
        assert_eq!(registry.lookup(&MessageType::of::<i32>()).len(), 1);
    }

    #[test]
    fn test_duplicate_registration_changes_nothing() {
        let mut registry = SubscriptionRegistry::default();
        let subscriber = SubscriberRef::new(&Arc::new(Ranked));

        registry
            .subscribe_all(&subscriber, &methods_of::<Ranked>())
            .unwrap();
        let result = registry.subscribe_all(&subscriber, &methods_of::<Ranked>());

        assert!(matches!(
            result,
            Err(EventBusError::DuplicateSubscription { .. })
        ));
        assert_eq!(registry.lookup(&MessageType::of::<String>()).len(), 2);
    }

    #[test]
    fn test_unsubscribe_deactivates_and_removes() {
        let mut registry = SubscriptionRegistry::default();
        let subscriber = SubscriberRef::new(&Arc::new(Ranked));
        let subscriptions = registry
            .subscribe_all(&subscriber, &methods_of::<Ranked>())
            .unwrap();

        assert!(registry.is_registered(subscriber.id()));
        assert_eq!(registry.unsubscribe(subscriber.id()), Some(3));

        assert!(subscriptions.iter().all(|s| !s.is_active()));
        assert!(!registry.is_registered(subscriber.id()));
        assert!(!registry.has_subscriptions(&MessageType::of::<String>()));
        assert_eq!(registry.unsubscribe(subscriber.id()), None);
    }
}
