//! The handler capability: what a route ultimately calls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::failure::BoxError;

/// Merged query and static parameters handed to a handler.
pub type Params = Map<String, Value>;

/// Error a handler may return. Always treated as an operational failure.
pub type HandlerError = BoxError;

/// Future behind a deferred reply.
pub type DeferredFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send + 'static>>;

/// The decoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The body parsed as a JSON object, array or `null`.
    Json(Value),
    /// Anything else, as (lossily decoded) text. An empty body is `Text("")`.
    Text(String),
}

impl Payload {
    /// Classify a raw body. Never fails: bodies that are not structured JSON stay text.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ (Value::Object(_) | Value::Array(_) | Value::Null)) => Payload::Json(value),
            _ => Payload::Text(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// A JSON view of the payload, for logging.
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Json(value) => value.clone(),
            Payload::Text(text) => Value::String(text.clone()),
        }
    }
}

/// What a handler hands back.
///
/// `null` or an empty string means "no content", any other string is sent as
/// text, everything else as JSON.
pub enum Reply {
    /// The value is ready now.
    Immediate(Value),
    /// The value arrives later. Failures inside it are reported to operators
    /// only, the caller gets a 500.
    Deferred(DeferredFuture),
}

impl Reply {
    pub fn empty() -> Self {
        Reply::Immediate(Value::Null)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Reply::Immediate(Value::String(text.into()))
    }

    pub fn json(value: Value) -> Self {
        Reply::Immediate(value)
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Reply::Deferred(Box::pin(future))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Immediate(value)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Reply::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Something a route can invoke.
pub trait Handler: Send + Sync {
    fn invoke(&self, params: Params, payload: Payload) -> Result<Reply, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(Params, Payload) -> Result<Reply, HandlerError> + Send + Sync,
{
    fn invoke(&self, params: Params, payload: Payload) -> Result<Reply, HandlerError> {
        self(params, payload)
    }
}
