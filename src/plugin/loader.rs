//! Plugin construction.
//!
//! Plugins are not loaded from disk. Each module path known to the service is
//! registered up front in a [`PluginRegistry`] together with a factory; the
//! [`PluginLoader`] builds each path at most once and hands out the shared
//! instance afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::failure::{ErrorReporter, OperationalFailure};
use crate::logger::{Channel, Logger, Severity};
use crate::notify::{MailMessage, Notifier};
use crate::plugin::{HandlerError, Plugin};

/// Builds a plugin instance from the shared context.
pub type PluginFactory = Arc<dyn Fn(&PluginContext) -> Result<Arc<dyn Plugin>, HandlerError> + Send + Sync>;

/// What a plugin gets to see of the service.
#[derive(Clone)]
pub struct PluginContext {
    config: Arc<Value>,
    logger: Logger,
    notifier: Arc<dyn Notifier>,
    reporter: Arc<ErrorReporter>,
}

impl PluginContext {
    pub fn new(config: Value, logger: Logger, notifier: Arc<dyn Notifier>, reporter: Arc<ErrorReporter>) -> Self {
        Self {
            config: Arc::new(config),
            logger,
            notifier,
            reporter,
        }
    }

    /// The opaque `[settings]` table.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Log on the plugins channel.
    pub fn log(&self, severity: Severity, message: impl fmt::Display, data: Option<&Value>) {
        self.logger.log(Channel::Plugins, severity, message, data);
    }

    /// Queue a mail. A hand-off failure is escalated as an operational failure.
    pub fn sendmail(&self, message: MailMessage) {
        let recipients = message.to.join(", ");
        let subject = message.subject.clone();
        match self.notifier.send(message) {
            Ok(()) => self.logger.info(
                Channel::Plugins,
                format!("Message queued for: {recipients} subject: {subject}"),
            ),
            Err(e) => self
                .reporter
                .report(&OperationalFailure::with_cause("Unable to send mail", e)),
        }
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Module paths the service knows how to build.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` loadable through `factory`.
    pub fn register<F>(&mut self, path: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PluginContext) -> Result<Arc<dyn Plugin>, HandlerError> + Send + Sync + 'static,
    {
        self.factories.insert(path.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.factories.keys().collect();
        paths.sort();
        f.debug_struct("PluginRegistry").field("paths", &paths).finish()
    }
}

/// Builds and caches plugin instances.
pub struct PluginLoader {
    registry: PluginRegistry,
    context: PluginContext,
    instances: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginLoader {
    pub fn new(registry: PluginRegistry, context: PluginContext) -> Self {
        Self {
            registry,
            context,
            instances: HashMap::new(),
        }
    }

    /// The instance for `path`, building it on first use.
    pub fn load(&mut self, path: &str) -> Result<Arc<dyn Plugin>, OperationalFailure> {
        if let Some(instance) = self.instances.get(path) {
            return Ok(Arc::clone(instance));
        }

        let factory = self
            .registry
            .factories
            .get(path)
            .ok_or_else(|| OperationalFailure::new(format!("Plugin file [{path}] not found")))?;

        let instance = factory(&self.context)
            .map_err(|e| OperationalFailure::with_cause(format!("Plugin [{path}] failed to initialize"), e))?;

        self.instances.insert(path.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Number of distinct instances built so far.
    pub fn loaded(&self) -> usize {
        self.instances.len()
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("registry", &self.registry)
            .field("loaded", &self.instances.len())
            .finish()
    }
}
