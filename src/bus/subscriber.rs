//! Subscriber declarations
//!
//! A subscriber type lists its handler methods by implementing [`Subscribe`]:
//!
//! ```
//! use msgbus::bus::api::{Subscribe, SubscriberMethods, ThreadMode};
//!
//! struct Audit;
//!
//! impl Subscribe for Audit {
//!     fn subscriber_methods(methods: &mut SubscriberMethods<Self>) {
//!         methods
//!             .on::<String>("on_text", |_audit, text| {
//!                 println!("audit: {text}");
//!                 Ok(None)
//!             })
//!             .priority(10)
//!             .thread_mode(ThreadMode::Posting);
//!     }
//! }
//! ```
//!
//! Each declaration is type-erased into a [`SubscriberMethod`] carrying an
//! invoker closure, so the dispatch engine never needs to know `S`.

use crate::bus::error::HandlerError;
use crate::bus::message::{Envelope, Message, MessageKind, MessageType};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

/// What a handler body produces: an optional follow-up message to post
pub type HandlerResult = Result<Option<Envelope>, HandlerError>;

/// A subscriber instance with its concrete type erased
pub type ErasedSubscriber = dyn Any + Send + Sync;

pub(crate) type Invoker = Arc<dyn Fn(&ErasedSubscriber, &Envelope) -> HandlerResult + Send + Sync>;

/// Where a handler runs relative to the posting thread
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadMode {
    /// Inline on the posting thread
    #[default]
    Posting,
    /// On the main thread; inline when already there
    Main,
    /// Always queued to the main thread, in post order
    MainOrdered,
    /// On the background worker when posted from the main thread, inline otherwise
    Background,
    /// On a fresh executor job
    Async,
}

/// A subscriber type that declares handler methods
pub trait Subscribe: Any + Send + Sync + Sized {
    fn subscriber_methods(_methods: &mut SubscriberMethods<Self>) {}
}

/// One declared handler, independent of its subscriber's concrete type
#[derive(Clone)]
pub struct SubscriberMethod {
    name: &'static str,
    declaring_type: &'static str,
    message_type: MessageType,
    thread_mode: ThreadMode,
    priority: i32,
    sticky: bool,
    iteration: usize,
    invoker: Invoker,
}

impl SubscriberMethod {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type that declared the method; differs from the subscriber for inherited methods
    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky
    }

    /// Inheritance depth: 0 for the subscriber's own methods
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Identity used for duplicate detection
    pub fn method_key(&self) -> String {
        format!(
            "{}#{}({})",
            self.declaring_type,
            self.name,
            self.message_type.name()
        )
    }

    pub(crate) fn invoke(
        &self,
        subscriber: &ErasedSubscriber,
        envelope: &Envelope,
    ) -> HandlerResult {
        (self.invoker)(subscriber, envelope)
    }

    fn overrides(&self, other: &SubscriberMethod) -> bool {
        self.name == other.name && self.message_type == other.message_type
    }
}

impl fmt::Debug for SubscriberMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberMethod")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("message_type", &self.message_type)
            .field("thread_mode", &self.thread_mode)
            .field("priority", &self.priority)
            .field("sticky", &self.sticky)
            .field("iteration", &self.iteration)
            .finish()
    }
}

/// Builder that collects a subscriber type's handler declarations
pub struct SubscriberMethods<S> {
    own: Vec<SubscriberMethod>,
    inherited: Vec<SubscriberMethod>,
    _subscriber: std::marker::PhantomData<fn(&S)>,
}

impl<S: Any + Send + Sync> SubscriberMethods<S> {
    fn new() -> Self {
        Self {
            own: Vec::new(),
            inherited: Vec::new(),
            _subscriber: std::marker::PhantomData,
        }
    }

    /// Run a declaration closure and return the resulting methods
    pub fn collect(declare: impl FnOnce(&mut Self)) -> Vec<SubscriberMethod> {
        let mut methods = Self::new();
        declare(&mut methods);
        methods.into_methods()
    }

    /// Handler for messages viewable as `T`
    ///
    /// Subtypes reach a base-typed handler through [`Message::upcast`]; a
    /// subtype without that view fails the invocation.
    pub fn on<T: Message>(
        &mut self,
        name: &'static str,
        handler: impl Fn(&S, &T) -> HandlerResult + Send + Sync + 'static,
    ) -> MethodOptions<'_> {
        let invoker: Invoker = Arc::new(move |subscriber: &ErasedSubscriber, envelope: &Envelope| {
            let subscriber = downcast_subscriber::<S>(subscriber)?;
            let message = envelope.downcast_ref::<T>().ok_or_else(|| {
                HandlerError::from(format!(
                    "message {} cannot be viewed as {}",
                    envelope.message_type(),
                    std::any::type_name::<T>()
                ))
            })?;
            handler(subscriber, message)
        });
        self.push(name, MessageType::of::<T>(), invoker)
    }

    /// Handler for any message matching the kind `K`, typically an interface or the root
    pub fn on_kind<K: MessageKind>(
        &mut self,
        name: &'static str,
        handler: impl Fn(&S, &Envelope) -> HandlerResult + Send + Sync + 'static,
    ) -> MethodOptions<'_> {
        let invoker: Invoker = Arc::new(move |subscriber: &ErasedSubscriber, envelope: &Envelope| {
            let subscriber = downcast_subscriber::<S>(subscriber)?;
            handler(subscriber, envelope)
        });
        self.push(name, MessageType::of::<K>(), invoker)
    }

    /// Include the methods of a composed parent subscriber
    ///
    /// Parent methods are overridden by own methods with the same name and
    /// message type, regardless of declaration order.
    pub fn inherit<P: Subscribe>(&mut self, project: fn(&S) -> &P) -> &mut Self {
        for parent in SubscriberMethods::<P>::collect(P::subscriber_methods) {
            let parent_invoker = Arc::clone(&parent.invoker);
            let invoker: Invoker = Arc::new(move |subscriber: &ErasedSubscriber, envelope: &Envelope| {
                let subscriber = downcast_subscriber::<S>(subscriber)?;
                let parent: &ErasedSubscriber = project(subscriber);
                parent_invoker(parent, envelope)
            });
            self.inherited.push(SubscriberMethod {
                iteration: parent.iteration + 1,
                invoker,
                ..parent
            });
        }
        self
    }

    fn push(
        &mut self,
        name: &'static str,
        message_type: MessageType,
        invoker: Invoker,
    ) -> MethodOptions<'_> {
        self.own.push(SubscriberMethod {
            name,
            declaring_type: std::any::type_name::<S>(),
            message_type,
            thread_mode: ThreadMode::default(),
            priority: 0,
            sticky: false,
            iteration: 0,
            invoker,
        });
        let index = self.own.len() - 1;
        MethodOptions {
            method: &mut self.own[index],
        }
    }

    fn into_methods(self) -> Vec<SubscriberMethod> {
        let mut methods = self.own;
        for parent in self.inherited {
            let overridden = methods
                .iter()
                .any(|m| m.iteration < parent.iteration && m.overrides(&parent));
            if !overridden {
                methods.push(parent);
            }
        }
        methods
    }
}

fn downcast_subscriber<S: Any>(subscriber: &ErasedSubscriber) -> Result<&S, HandlerError> {
    subscriber.downcast_ref::<S>().ok_or_else(|| {
        HandlerError::from(format!(
            "subscriber is not a {}",
            std::any::type_name::<S>()
        ))
    })
}

/// Per-method options, chained after [`SubscriberMethods::on`]
pub struct MethodOptions<'a> {
    method: &'a mut SubscriberMethod,
}

impl MethodOptions<'_> {
    pub fn priority(self, priority: i32) -> Self {
        self.method.priority = priority;
        self
    }

    pub fn thread_mode(self, thread_mode: ThreadMode) -> Self {
        self.method.thread_mode = thread_mode;
        self
    }

    pub fn sticky(self) -> Self {
        self.method.sticky = true;
        self
    }
}

/// A registered subscriber instance
///
/// Identity is the address of the shared allocation, so two `Arc` clones of
/// one subscriber are the same subscriber.
#[derive(Clone)]
pub struct SubscriberRef {
    id: usize,
    type_name: &'static str,
    instance: Arc<ErasedSubscriber>,
}

impl SubscriberRef {
    pub fn new<S: Any + Send + Sync>(subscriber: &Arc<S>) -> Self {
        Self {
            id: identity(subscriber),
            type_name: std::any::type_name::<S>(),
            instance: Arc::clone(subscriber) as Arc<ErasedSubscriber>,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn instance(&self) -> &ErasedSubscriber {
        &*self.instance
    }

    pub fn downcast<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        Arc::clone(&self.instance).downcast::<S>().ok()
    }
}

impl PartialEq for SubscriberRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriberRef {}

impl fmt::Debug for SubscriberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.type_name, self.id)
    }
}

pub(crate) fn identity<S>(subscriber: &Arc<S>) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}
