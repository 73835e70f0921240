//! Route registration, resolution and dispatch.
//!
//! # Data Flow
//! ```text
//! Startup (single writer):
//!     PluginRegistration[]
//!     → register_all (load plugin, validate route, compile pattern)
//!     → Router frozen behind Arc
//!
//! Per request (many readers, no locks):
//!     (method, path)
//!     → resolve (first match in registration order)
//!     → dispatch (merge params, invoke, classify failures)
//! ```
//!
//! Patterns are case-insensitive regular expressions searched anywhere in the
//! path. A route matches when its pattern matches and its method is equal.

mod route;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};

use crate::failure::{capture_panic_stacks, ClassifiedError, OperationalFailure, RequestFailure};
use crate::logger::{Channel, Logger, Severity};
use crate::parser::Method;
use crate::plugin::{Member, Params, Payload, PluginLoader, PluginRegistration, Reply};
use crate::server::StatusCode;

pub use route::{PatternMatcher, Route, RouteDescriptor};

/// Future behind a deferred dispatch. Any failure in it is operational.
pub type DeferredDispatch = Pin<Box<dyn Future<Output = Result<Value, OperationalFailure>> + Send + 'static>>;

/// Outcome of a successful dispatch.
pub enum Dispatch {
    /// The handler answered right away.
    Immediate(Value),
    /// The handler answered with a deferred value; await it for the result.
    Deferred(DeferredDispatch),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Dispatch::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The route table plus the plugin instances it binds to.
///
/// Built with `&mut self` at startup, then shared read-only.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    plugins: Vec<String>,
    loader: PluginLoader,
    logger: Logger,
}

impl Router {
    pub fn new(loader: PluginLoader, logger: Logger) -> Self {
        Self {
            routes: Vec::new(),
            plugins: Vec::new(),
            loader,
            logger,
        }
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Names of plugins registered through [`Router::register_all`].
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Bind one route of `plugin`.
    pub fn register(&mut self, plugin: &PluginRegistration, route: &RouteDescriptor) -> Result<(), OperationalFailure> {
        let instance = self.loader.load(&plugin.path)?;

        let pattern = route
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                OperationalFailure::new(format!(
                    "No route match pattern specified in routes for plugin [{}]",
                    plugin.name
                ))
            })?;

        let method = match route.method.as_deref() {
            None => Method::GET,
            Some(name) => name.parse::<Method>().map_err(|e| {
                OperationalFailure::with_cause(format!("Invalid method [{name}] for route [{pattern}]"), e)
            })?,
        };

        if self.is_duplicate(method, pattern) {
            return Err(OperationalFailure::new(format!(
                "Duplicate route [{pattern}] when adding plugin [{}]",
                plugin.name
            )));
        }

        let callback = route
            .callback
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OperationalFailure::new(format!("Callback method not defined for route [{pattern}]")))?;

        let handler = match instance.member(callback) {
            Some(Member::Callback(handler)) => handler,
            Some(Member::Property(_)) => {
                return Err(OperationalFailure::new(format!(
                    "Callback [{callback}] defined for route [{pattern}] is not a function"
                )))
            }
            None => {
                return Err(OperationalFailure::new(format!(
                    "Callback function [{callback}] not found in plugin [{}]",
                    plugin.name
                )))
            }
        };

        let matcher = PatternMatcher::new(pattern).map_err(|e| {
            OperationalFailure::with_cause(format!("Invalid match pattern [{pattern}] for plugin [{}]", plugin.name), e)
        })?;

        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            matcher,
            plugin: plugin.name.clone(),
            callback: callback.to_string(),
            handler,
            params: route.params.clone(),
        });

        self.logger.log(
            Channel::Router,
            Severity::Info,
            format!("Registered route {method} [{pattern}] -> {}.{callback}", plugin.name),
            Some(&json!({ "path": plugin.path, "params": route.params })),
        );

        Ok(())
    }

    /// Register every plugin in order.
    ///
    /// A plugin without routes is skipped and the batch carries on. The first
    /// route that fails to register aborts the batch.
    pub fn register_all(&mut self, plugins: &[PluginRegistration]) -> Result<(), OperationalFailure> {
        for plugin in plugins {
            let routes = match plugin.routes.as_deref() {
                Some(routes) if !routes.is_empty() => routes,
                _ => {
                    self.logger.warn(
                        Channel::Router,
                        format!("Plugin [{}] has no routes, skipping", plugin.name),
                    );
                    continue;
                }
            };

            for route in routes {
                self.register(plugin, route)?;
            }

            self.plugins.push(plugin.name.clone());
        }

        Ok(())
    }

    /// Whether any route's pattern matches `path`, whatever its method.
    pub fn exists(&self, path: &str) -> bool {
        self.routes.iter().any(|route| route.matches_path(path))
    }

    /// The first route, in registration order, serving `method` on `path`.
    pub fn resolve(&self, method: Method, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(method, path))
    }

    // A pattern is a duplicate when it would resolve to an existing route if
    // requested as a path, or when the same text is already bound to the method.
    fn is_duplicate(&self, method: Method, pattern: &str) -> bool {
        self.resolve(method, pattern).is_some()
            || self
                .routes
                .iter()
                .any(|route| route.method == method && route.pattern == pattern)
    }

    /// Resolve the route for `method` and `path` and invoke its handler.
    ///
    /// Static route parameters override query parameters of the same name.
    /// Handler errors and panics come back as operational failures, both
    /// immediately and from a deferred reply.
    pub fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: Params,
        payload: Payload,
    ) -> Result<Dispatch, ClassifiedError> {
        let Some(route) = self.resolve(method, path) else {
            let failure = if self.exists(path) {
                RequestFailure::method_not_supported(method)
            } else {
                RequestFailure::new(StatusCode::UnprocessableEntity, format!("Route [{path}] not found"))
            };
            return Err(failure.into());
        };

        let mut params = query;
        for (key, value) in &route.params {
            params.insert(key.clone(), value.clone());
        }

        let target = format!("{}.{} for route [{}]", route.plugin, route.callback, route.pattern);
        self.logger.info(Channel::Router, format!("Dispatching {method} {path} to {target}"));

        capture_panic_stacks();
        let handler = Arc::clone(&route.handler);
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(params, payload))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return Err(OperationalFailure::with_cause(format!("Callback {target} failed"), e).into());
            }
            Err(panic) => {
                return Err(OperationalFailure::from_panic(format!("Callback {target}"), panic).into());
            }
        };

        match reply {
            Reply::Immediate(value) => Ok(Dispatch::Immediate(value)),
            Reply::Deferred(future) => Ok(Dispatch::Deferred(Box::pin(async move {
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(OperationalFailure::with_cause(
                        format!("Deferred result of {target} failed"),
                        e,
                    )),
                    Err(panic) => Err(OperationalFailure::from_panic(
                        format!("Deferred result of {target}"),
                        panic,
                    )),
                }
            }))),
        }
    }
}
