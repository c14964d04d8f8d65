//! Message type model
//!
//! Rust has no runtime class hierarchy, so message types declare theirs:
//!
//! - [`MessageKind`] is the type-level declaration: which interfaces a type
//!   implements and which base type it extends. Every concrete type extends
//!   [`AnyMessage`] unless it says otherwise; interface markers return `None`
//!   from [`MessageKind::base_type`].
//! - [`Message`] is the instance-level, object safe trait for posted values.
//!   A subtype that embeds its base value exposes it through [`Message::upcast`]
//!   so handlers typed on the base can read it.
//! - [`Envelope`] is what actually travels through the bus.
//!
//! ```
//! use msgbus::bus::api::{Envelope, Message, MessageKind, MessageType};
//! use std::any::{Any, TypeId};
//!
//! /// Interface marker
//! struct Audited;
//! impl MessageKind for Audited {
//!     fn base_type() -> Option<MessageType> { None }
//! }
//!
//! #[derive(Debug)]
//! struct Login { user: String }
//! impl MessageKind for Login {}
//! impl Message for Login {}
//!
//! #[derive(Debug)]
//! struct AdminLogin { login: Login }
//! impl MessageKind for AdminLogin {
//!     fn interfaces() -> Vec<MessageType> { vec![MessageType::of::<Audited>()] }
//!     fn base_type() -> Option<MessageType> { Some(MessageType::of::<Login>()) }
//! }
//! impl Message for AdminLogin {
//!     fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
//!         (target == TypeId::of::<Login>()).then_some(&self.login as &dyn Any)
//!     }
//! }
//!
//! let envelope = Envelope::new(AdminLogin { login: Login { user: "root".into() } });
//! assert_eq!(envelope.downcast_ref::<Login>().map(|l| l.user.as_str()), Some("root"));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Access to `Any` for trait objects
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Type-level hierarchy declaration
pub trait MessageKind: 'static {
    /// Interfaces this type directly implements
    fn interfaces() -> Vec<MessageType>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// The type this one extends; `None` for interfaces and the root
    fn base_type() -> Option<MessageType>
    where
        Self: Sized,
    {
        Some(MessageType::root())
    }
}

/// A value that can be posted to the bus
pub trait Message: MessageKind + AsAny + Send + Sync + fmt::Debug {
    /// View of an embedded base type value, for any ancestor other than the
    /// concrete type itself
    fn upcast(&self, _target: TypeId) -> Option<&dyn Any> {
        None
    }
}

/// Root of every message hierarchy, the equivalent of `object`
pub enum AnyMessage {}

impl MessageKind for AnyMessage {
    fn base_type() -> Option<MessageType> {
        None
    }
}

/// Runtime descriptor of a message type
///
/// Equality and hashing use the `TypeId` only.
#[derive(Clone, Copy)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
    interfaces: fn() -> Vec<MessageType>,
    base: fn() -> Option<MessageType>,
}

impl MessageType {
    pub fn of<K: MessageKind>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: std::any::type_name::<K>(),
            interfaces: K::interfaces,
            base: K::base_type,
        }
    }

    /// The [`AnyMessage`] root type
    pub fn root() -> Self {
        Self::of::<AnyMessage>()
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interfaces(&self) -> Vec<MessageType> {
        (self.interfaces)()
    }

    pub fn base_type(&self) -> Option<MessageType> {
        (self.base)()
    }

    pub fn is<K: MessageKind>(&self) -> bool {
        self.id == TypeId::of::<K>()
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageType({})", self.name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A posted message together with its runtime type
///
/// Clones share the payload; [`Envelope::ptr_eq`] compares identity.
#[derive(Clone)]
pub struct Envelope {
    message_type: MessageType,
    payload: Arc<dyn Message>,
}

impl Envelope {
    pub fn new<T: Message>(message: T) -> Self {
        Self::from_arc(Arc::new(message))
    }

    pub fn from_arc<T: Message>(message: Arc<T>) -> Self {
        Self {
            message_type: MessageType::of::<T>(),
            payload: message,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn message(&self) -> &dyn Message {
        &*self.payload
    }

    pub fn is<T: MessageKind>(&self) -> bool {
        self.message_type.is::<T>()
    }

    /// Borrow the payload as `T`, either exactly or through an upcast view
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        let message: &dyn Message = &*self.payload;
        if let Some(exact) = message.as_any().downcast_ref::<T>() {
            return Some(exact);
        }
        message
            .upcast(TypeId::of::<T>())
            .and_then(|view| view.downcast_ref::<T>())
    }

    /// Shared handle to the payload when it is exactly `T`
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).into_any_arc().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &Envelope) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// True when `value` is this payload or one of its upcast views
    pub fn holds<T: Any>(&self, value: &T) -> bool {
        if let Some(envelope) = (value as &dyn Any).downcast_ref::<Envelope>() {
            return self.ptr_eq(envelope);
        }
        self.downcast_ref::<T>()
            .is_some_and(|view| std::ptr::eq(view, value))
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.payload, f)
    }
}

macro_rules! std_messages {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl MessageKind for $ty {}
            impl Message for $ty {}
        )+
    };
}

std_messages!(
    String,
    &'static str,
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
);
