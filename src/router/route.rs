//! Routes and the pattern they match on.

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::parser::Method;
use crate::plugin::{Handler, Params};

/// A route as written in the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouteDescriptor {
    /// Method name, any case. GET when absent.
    pub method: Option<String>,
    /// Regular expression searched for in the request path.
    #[serde(rename = "match")]
    pub pattern: Option<String>,
    /// Name of the plugin member to call.
    pub callback: Option<String>,
    /// Static parameters; they win over query parameters of the same name.
    pub params: Params,
}

impl RouteDescriptor {
    pub fn new(method: &str, pattern: &str, callback: &str) -> Self {
        Self {
            method: Some(method.to_string()),
            pattern: Some(pattern.to_string()),
            callback: Some(callback.to_string()),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// Case-insensitive, unanchored path pattern.
///
/// The pattern may appear anywhere in the path; `^` and `$` anchor it
/// explicitly.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// A registered route.
pub struct Route {
    pub(crate) method: Method,
    pub(crate) pattern: String,
    pub(crate) matcher: PatternMatcher,
    pub(crate) plugin: String,
    pub(crate) callback: String,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) params: Params,
}

impl Route {
    pub fn method(&self) -> Method {
        self.method
    }

    /// The pattern as configured.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Name of the plugin the callback lives on.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn callback(&self) -> &str {
        &self.callback
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Whether the pattern occurs in `path`, ignoring method.
    pub fn matches_path(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Whether this route serves `method` on `path`.
    pub fn matches(&self, method: Method, path: &str) -> bool {
        self.method == method && self.matches_path(path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("plugin", &self.plugin)
            .field("callback", &self.callback)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
