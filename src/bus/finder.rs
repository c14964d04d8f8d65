//! Subscriber method discovery
//!
//! Methods come from, in order of preference:
//! 1. indexes supplied to the builder ([`SubscriberInfoIndex`])
//! 2. the link-time index populated by [`subscriber_index!`](crate::subscriber_index)
//! 3. the subscriber's own [`Subscribe`] declaration
//!
//! The first two are skipped when the bus ignores generated indexes.

use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::message::MessageType;
use crate::bus::subscriber::{Subscribe, SubscriberMethod, SubscriberMethods};
use crate::core::sync::handle_mutex_poison;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};

static METHOD_CACHE: LazyLock<Mutex<HashMap<TypeId, Arc<[SubscriberMethod]>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A precomputed source of subscriber methods
pub trait SubscriberInfoIndex: Send + Sync {
    /// Methods for the subscriber type, or `None` when this index does not know it
    fn subscriber_methods(&self, subscriber_type: TypeId) -> Option<Vec<SubscriberMethod>>;
}

/// Index backed by a map, built up front
#[derive(Default)]
pub struct SimpleSubscriberInfoIndex {
    entries: HashMap<TypeId, Vec<SubscriberMethod>>,
}

impl SimpleSubscriberInfoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriber<S: Any + Send + Sync>(
        mut self,
        declare: impl FnOnce(&mut SubscriberMethods<S>),
    ) -> Self {
        self.entries
            .insert(TypeId::of::<S>(), SubscriberMethods::<S>::collect(declare));
        self
    }
}

impl SubscriberInfoIndex for SimpleSubscriberInfoIndex {
    fn subscriber_methods(&self, subscriber_type: TypeId) -> Option<Vec<SubscriberMethod>> {
        self.entries.get(&subscriber_type).cloned()
    }
}

/// Entry in the link-time subscriber index
pub struct IndexedSubscriber {
    pub subscriber_type: fn() -> TypeId,
    pub methods: fn() -> Vec<SubscriberMethod>,
}

inventory::collect!(IndexedSubscriber);

/// Register a subscriber's methods in the link-time index
///
/// ```ignore
/// msgbus::subscriber_index!(Widget, Widget::declare);
/// ```
#[macro_export]
macro_rules! subscriber_index {
    ($subscriber:ty, $declare:expr) => {
        $crate::inventory::submit! {
            $crate::bus::finder::IndexedSubscriber {
                subscriber_type: || ::std::any::TypeId::of::<$subscriber>(),
                methods: || $crate::bus::subscriber::SubscriberMethods::<$subscriber>::collect($declare),
            }
        }
    };
}

/// Resolves and caches the handler methods of subscriber types
pub struct SubscriberMethodFinder {
    indexes: Vec<Arc<dyn SubscriberInfoIndex>>,
    strict_method_verification: bool,
    ignore_generated_index: bool,
}

impl SubscriberMethodFinder {
    pub fn new(
        indexes: Vec<Arc<dyn SubscriberInfoIndex>>,
        strict_method_verification: bool,
        ignore_generated_index: bool,
    ) -> Self {
        Self {
            indexes,
            strict_method_verification,
            ignore_generated_index,
        }
    }

    pub fn find<S: Subscribe>(&self) -> EventBusResult<Arc<[SubscriberMethod]>> {
        let type_id = TypeId::of::<S>();
        let subscriber_type = std::any::type_name::<S>();

        if let Some(methods) = lock_cache()?.get(&type_id) {
            return Ok(Arc::clone(methods));
        }

        let declared = self
            .from_indexes(type_id)
            .unwrap_or_else(|| SubscriberMethods::<S>::collect(S::subscriber_methods));
        let methods = self.verify(subscriber_type, declared)?;
        if methods.is_empty() {
            return Err(EventBusError::NoSubscriberMethods { subscriber_type });
        }

        log::trace!(
            "Found {} subscriber methods for {}",
            methods.len(),
            subscriber_type
        );
        let methods: Arc<[SubscriberMethod]> = methods.into();
        let mut cache = lock_cache()?;
        let entry = cache.entry(type_id).or_insert(methods);
        Ok(Arc::clone(entry))
    }

    fn from_indexes(&self, type_id: TypeId) -> Option<Vec<SubscriberMethod>> {
        if self.ignore_generated_index {
            return None;
        }
        self.indexes
            .iter()
            .find_map(|index| index.subscriber_methods(type_id))
            .or_else(|| {
                inventory::iter::<IndexedSubscriber>()
                    .find(|entry| (entry.subscriber_type)() == type_id)
                    .map(|entry| (entry.methods)())
            })
    }

    fn verify(
        &self,
        subscriber_type: &'static str,
        methods: Vec<SubscriberMethod>,
    ) -> EventBusResult<Vec<SubscriberMethod>> {
        let mut seen: HashSet<(&'static str, &'static str, MessageType)> = HashSet::new();
        let mut verified = Vec::with_capacity(methods.len());

        for method in methods {
            let problem = if method.name().is_empty() {
                Some("method name is empty".to_string())
            } else if !seen.insert((method.declaring_type(), method.name(), method.message_type()))
            {
                Some(format!(
                    "declared more than once for message {}",
                    method.message_type()
                ))
            } else {
                None
            };

            match problem {
                Some(reason) if self.strict_method_verification => {
                    return Err(EventBusError::IllegalSubscriberMethod {
                        subscriber_type,
                        method: method.name().to_string(),
                        reason,
                    });
                }
                Some(reason) => {
                    log::warn!(
                        "Ignoring subscriber method {}.{}: {}",
                        subscriber_type,
                        method.name(),
                        reason
                    );
                }
                None => verified.push(method),
            }
        }
        Ok(verified)
    }
}

/// Drop every cached method list
pub(crate) fn clear_cache() -> EventBusResult<()> {
    lock_cache()?.clear();
    Ok(())
}

fn lock_cache(
) -> EventBusResult<std::sync::MutexGuard<'static, HashMap<TypeId, Arc<[SubscriberMethod]>>>> {
    handle_mutex_poison(METHOD_CACHE.lock(), |message| {
        EventBusError::Synchronisation { message }
    })
}
