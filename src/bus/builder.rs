//! Bus configuration and construction

use crate::bus::bus::{BusCore, EventBus};
use crate::bus::error::{EventBusError, EventBusResult};
use crate::bus::executor::{Executor, TokioExecutor};
use crate::bus::finder::{SubscriberInfoIndex, SubscriberMethodFinder};
use crate::bus::poster::main_thread::MainThreadSupport;
use crate::core::sync::handle_mutex_poison;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

static DEFAULT_BUS: Mutex<Option<EventBus>> = Mutex::new(None);

/// Behaviour switches for a bus
///
/// Keys are kebab-case in TOML; every key is optional:
///
/// ```toml
/// event-inheritance = true
/// send-no-subscriber-event = false
/// background-poll-timeout-ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EventBusConfig {
    /// Deliver to handlers of base types and interfaces too
    pub event_inheritance: bool,
    pub log_no_subscriber_messages: bool,
    pub log_subscriber_exceptions: bool,
    pub send_no_subscriber_event: bool,
    pub send_subscriber_exception_event: bool,
    /// Return handler failures from `post` instead of containing them
    pub throw_subscriber_exception: bool,
    pub strict_method_verification: bool,
    pub ignore_generated_index: bool,
    /// How long an idle background worker waits before exiting
    pub background_poll_timeout_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            event_inheritance: true,
            log_no_subscriber_messages: true,
            log_subscriber_exceptions: true,
            send_no_subscriber_event: true,
            send_subscriber_exception_event: true,
            throw_subscriber_exception: false,
            strict_method_verification: false,
            ignore_generated_index: false,
            background_poll_timeout_ms: 1000,
        }
    }
}

impl EventBusConfig {
    pub fn from_toml_str(contents: &str) -> EventBusResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| EventBusError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EventBusResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EventBusError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            EventBusError::Config { message } => EventBusError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    fn validate(&self) -> EventBusResult<()> {
        if self.background_poll_timeout_ms == 0 {
            return Err(EventBusError::Config {
                message: "background-poll-timeout-ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn background_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.background_poll_timeout_ms)
    }
}

/// Builds an [`EventBus`]
#[derive(Default)]
pub struct EventBusBuilder {
    config: EventBusConfig,
    executor: Option<Arc<dyn Executor>>,
    main_thread_support: Option<Arc<dyn MainThreadSupport>>,
    indexes: Vec<Arc<dyn SubscriberInfoIndex>>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: EventBusConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_event_inheritance(mut self, enabled: bool) -> Self {
        self.config.event_inheritance = enabled;
        self
    }

    pub fn with_log_no_subscriber_messages(mut self, enabled: bool) -> Self {
        self.config.log_no_subscriber_messages = enabled;
        self
    }

    pub fn with_log_subscriber_exceptions(mut self, enabled: bool) -> Self {
        self.config.log_subscriber_exceptions = enabled;
        self
    }

    pub fn with_send_no_subscriber_event(mut self, enabled: bool) -> Self {
        self.config.send_no_subscriber_event = enabled;
        self
    }

    pub fn with_send_subscriber_exception_event(mut self, enabled: bool) -> Self {
        self.config.send_subscriber_exception_event = enabled;
        self
    }

    pub fn with_throw_subscriber_exception(mut self, enabled: bool) -> Self {
        self.config.throw_subscriber_exception = enabled;
        self
    }

    pub fn with_strict_method_verification(mut self, enabled: bool) -> Self {
        self.config.strict_method_verification = enabled;
        self
    }

    pub fn with_ignore_generated_index(mut self, enabled: bool) -> Self {
        self.config.ignore_generated_index = enabled;
        self
    }

    pub fn with_background_poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.background_poll_timeout_ms = timeout.as_millis().max(1) as u64;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_main_thread_support(mut self, support: Arc<dyn MainThreadSupport>) -> Self {
        self.main_thread_support = Some(support);
        self
    }

    /// Add a precomputed subscriber index, consulted before `Subscribe` declarations
    pub fn add_index(mut self, index: Arc<dyn SubscriberInfoIndex>) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn build(self) -> EventBusResult<EventBus> {
        self.config.validate()?;
        let finder = SubscriberMethodFinder::new(
            self.indexes,
            self.config.strict_method_verification,
            self.config.ignore_generated_index,
        );
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(TokioExecutor::new()));
        Ok(EventBus::from_core(BusCore::new(
            self.config,
            finder,
            executor,
            self.main_thread_support,
        )))
    }

    /// Build and install as the process-wide default bus
    ///
    /// Fails when a default already exists, including one created lazily by
    /// [`EventBus::get_default`].
    pub fn install_default_event_bus(self) -> EventBusResult<EventBus> {
        let mut default = lock_default()?;
        if default.is_some() {
            return Err(EventBusError::DefaultAlreadyInstalled);
        }
        let bus = self.build()?;
        *default = Some(bus.clone());
        Ok(bus)
    }
}

fn lock_default() -> EventBusResult<std::sync::MutexGuard<'static, Option<EventBus>>> {
    handle_mutex_poison(DEFAULT_BUS.lock(), |message| {
        EventBusError::Synchronisation { message }
    })
}

/// The default bus, created with default settings on first use
pub(crate) fn default_bus() -> EventBusResult<EventBus> {
    let mut default = lock_default()?;
    if let Some(bus) = default.as_ref() {
        return Ok(bus.clone());
    }
    let bus = EventBusBuilder::new().build()?;
    *default = Some(bus.clone());
    Ok(bus)
}

/// Forget the default bus so the next access creates a fresh one
pub(crate) fn clear_default_bus() -> EventBusResult<()> {
    lock_default()?.take();
    Ok(())
}
