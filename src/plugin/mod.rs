//! Plugins: named collections of callbacks that routes bind to.
//!
//! A plugin is built once from its factory, with a [`PluginContext`] giving it
//! the shared settings, a logger and a way to send mail. Routes then look up
//! callbacks on the instance by name.

mod handler;
mod loader;
pub mod sample;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::router::RouteDescriptor;

pub use handler::{DeferredFuture, Handler, HandlerError, Params, Payload, Reply};
pub use loader::{PluginContext, PluginFactory, PluginLoader, PluginRegistry};

/// A plugin as listed in the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginRegistration {
    /// Human-readable name used in logs and errors.
    pub name: String,
    /// Module path the registry resolves to a factory.
    pub path: String,
    /// Routes bound to this plugin. `None` or empty means the plugin is skipped.
    pub routes: Option<Vec<RouteDescriptor>>,
}

/// Something exposed by a plugin under a name.
#[derive(Clone)]
pub enum Member {
    /// An invokable callback.
    Callback(Arc<dyn Handler>),
    /// A plain value. Routes cannot bind to it.
    Property(Value),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Callback(_) => f.write_str("Callback(..)"),
            Member::Property(value) => f.debug_tuple("Property").field(value).finish(),
        }
    }
}

/// A loaded plugin instance.
pub trait Plugin: Send + Sync {
    /// Look up a member by name.
    fn member(&self, name: &str) -> Option<Member>;
}

/// A [`Plugin`] assembled from closures.
#[derive(Default)]
pub struct PluginModule {
    members: HashMap<String, Member>,
}

impl PluginModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `handler` as the callback `name`.
    pub fn callback<H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.members.insert(name.into(), Member::Callback(Arc::new(handler)));
        self
    }

    /// Expose a non-invokable value as `name`.
    pub fn property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.members.insert(name.into(), Member::Property(value));
        self
    }
}

impl Plugin for PluginModule {
    fn member(&self, name: &str) -> Option<Member> {
        self.members.get(name).cloned()
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.members.keys().collect();
        names.sort();
        f.debug_struct("PluginModule").field("members", &names).finish()
    }
}
