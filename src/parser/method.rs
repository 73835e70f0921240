//! HTTP request methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::parser::error::Error;

/// HTTP request methods a route can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    /// GET method, the default for routes that do not name one.
    #[default]
    GET,
    /// POST method.
    POST,
    /// PUT method.
    PUT,
    /// DELETE method.
    DELETE,
    /// HEAD method.
    HEAD,
    /// OPTIONS method.
    OPTIONS,
    /// PATCH method.
    PATCH,
}

// Method names are compared case-insensitively: route files say "get" as often as "GET".
impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Method; 7] = [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
            Method::PATCH,
        ];

        ALL.into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidMethod(s.to_string()))
    }
}

impl Method {
    /// The canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// The method on a request line.
///
/// Requests may carry any method token; only the ones in [`Method`] can be
/// routed. Keeping the others lets the server answer them with 405 or 422
/// like any other unserved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMethod {
    Known(Method),
    Other(String),
}

impl RequestMethod {
    /// The routable method, if this is one.
    pub fn known(&self) -> Option<Method> {
        match self {
            RequestMethod::Known(method) => Some(*method),
            RequestMethod::Other(_) => None,
        }
    }
}

// Token characters from RFC 9110, section 5.6.2
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

impl FromStr for RequestMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(is_token_char) {
            return Err(Error::InvalidMethod(s.to_string()));
        }
        Ok(s.parse::<Method>()
            .map(RequestMethod::Known)
            .unwrap_or_else(|_| RequestMethod::Other(s.to_string())))
    }
}

impl PartialEq<Method> for RequestMethod {
    fn eq(&self, other: &Method) -> bool {
        self.known() == Some(*other)
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Known(method) => fmt::Display::fmt(method, f),
            RequestMethod::Other(name) => f.write_str(name),
        }
    }
}
