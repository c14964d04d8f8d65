//! Message type hierarchy resolution
//!
//! Resolution order is the type itself, then its interfaces depth-first, then
//! the base type by the same rule, up to the root. Results are cached process
//! wide since declarations never change at runtime.

use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::message::MessageType;
use crate::core::sync::handle_mutex_poison;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};

static HIERARCHY_CACHE: LazyLock<Mutex<HashMap<TypeId, Arc<[MessageType]>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Ordered list of types a message of `message_type` is delivered as
pub fn resolve(message_type: MessageType) -> EventBusResult<Arc<[MessageType]>> {
    {
        let cache = handle_mutex_poison(HIERARCHY_CACHE.lock(), |message| {
            EventBusError::Synchronisation { message }
        })?;
        if let Some(types) = cache.get(&message_type.id()) {
            return Ok(Arc::clone(types));
        }
    }

    let types: Arc<[MessageType]> = walk(message_type).into();

    let mut cache = handle_mutex_poison(HIERARCHY_CACHE.lock(), |message| {
        EventBusError::Synchronisation { message }
    })?;
    // A racing resolver may have inserted first; both results are identical
    let entry = cache
        .entry(message_type.id())
        .or_insert_with(|| Arc::clone(&types));
    Ok(Arc::clone(entry))
}

/// Drop every cached resolution
pub(crate) fn clear_cache() -> EventBusResult<()> {
    handle_mutex_poison(HIERARCHY_CACHE.lock(), |message| {
        EventBusError::Synchronisation { message }
    })?
    .clear();
    Ok(())
}

fn walk(message_type: MessageType) -> Vec<MessageType> {
    let mut ordered = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(message_type);

    while let Some(ty) = current {
        // A base chain that loops back ends at the first repeat
        if !seen.insert(ty) {
            break;
        }
        ordered.push(ty);
        add_interfaces(ty, &mut ordered, &mut seen);
        current = ty.base_type();
    }
    ordered
}

fn add_interfaces(ty: MessageType, ordered: &mut Vec<MessageType>, seen: &mut HashSet<MessageType>) {
    for interface in ty.interfaces() {
        if seen.insert(interface) {
            ordered.push(interface);
            add_interfaces(interface, ordered, seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{AnyMessage, Message, MessageKind};
    use serial_test::serial;

    struct Named;
    impl MessageKind for Named {
        fn base_type() -> Option<MessageType> {
            None
        }
    }

    struct Tagged;
    impl MessageKind for Tagged {
        fn interfaces() -> Vec<MessageType> {
            vec![MessageType::of::<Named>()]
        }
        fn base_type() -> Option<MessageType> {
            None
        }
    }

    #[derive(Debug)]
    struct Parent;
    impl MessageKind for Parent {
        fn interfaces() -> Vec<MessageType> {
            vec![MessageType::of::<Named>()]
        }
    }
    impl Message for Parent {}

    #[derive(Debug)]
    struct Child;
    impl MessageKind for Child {
        fn interfaces() -> Vec<MessageType> {
            vec![MessageType::of::<Tagged>()]
        }
        fn base_type() -> Option<MessageType> {
            Some(MessageType::of::<Parent>())
        }
    }
    impl Message for Child {}

    #[test]
    fn test_resolve_orders_self_interfaces_then_base() {
        let types = resolve(MessageType::of::<Child>()).unwrap();
        let expected = [
            MessageType::of::<Child>(),
            MessageType::of::<Tagged>(),
            MessageType::of::<Named>(),
            MessageType::of::<Parent>(),
            MessageType::root(),
        ];
        assert_eq!(&*types, &expected);
    }

    #[test]
    fn test_resolve_plain_type_ends_at_root() {
        let types = resolve(MessageType::of::<String>()).unwrap();
        assert_eq!(types.len(), 2);
        assert!(types[0].is::<String>());
        assert!(types[1].is::<AnyMessage>());
    }

    struct Ping;
    impl MessageKind for Ping {
        fn base_type() -> Option<MessageType> {
            Some(MessageType::of::<Pong>())
        }
    }

    struct Pong;
    impl MessageKind for Pong {
        fn base_type() -> Option<MessageType> {
            Some(MessageType::of::<Ping>())
        }
    }

    #[test]
    fn test_cyclic_base_chain_terminates() {
        let types = walk(MessageType::of::<Ping>());
        assert_eq!(types, vec![MessageType::of::<Ping>(), MessageType::of::<Pong>()]);
    }

    #[test]
    #[serial]
    fn test_resolve_is_cached() {
        let first = resolve(MessageType::of::<Parent>()).unwrap();
        let second = resolve(MessageType::of::<Parent>()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
