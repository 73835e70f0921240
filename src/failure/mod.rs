//! Failure classification.
//!
//! Every failure is one of two kinds:
//!
//! - [`RequestFailure`]: the caller can fix it. Carries the literal HTTP
//!   status and a message that is safe to show.
//! - [`OperationalFailure`]: something inside the service broke (a plugin,
//!   the configuration, a handler). The caller only ever sees a 500; the full
//!   detail goes to the operator channel through [`ErrorReporter`].

mod reporter;

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::panic;
use std::sync::Once;

use thiserror::Error;

use crate::server::StatusCode;

pub use reporter::ErrorReporter;

/// Boxed error type used for causes.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

thread_local! {
    // Backtrace of the last panic on this thread, taken by `from_panic`.
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Record the backtrace of every panic so a caught panic can report where it
/// happened rather than where it was caught.
///
/// Installed once per process. The previous hook still runs.
pub fn capture_panic_stacks() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            PANIC_STACK.with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(stack);
                }
            });
            previous(info);
        }));
    });
}

/// An internal failure that must not leak to the caller.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OperationalFailure {
    message: String,
    #[source]
    cause: Option<BoxError>,
    stack: String,
}

impl OperationalFailure {
    /// Create a failure without an underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            stack: Backtrace::force_capture().to_string(),
        }
    }

    /// Create a failure wrapping `cause`.
    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self {
            cause: Some(cause.into()),
            ..Self::new(message)
        }
    }

    /// Create a failure from a caught panic payload.
    ///
    /// Uses the panic-site backtrace when [`capture_panic_stacks`] is active.
    pub fn from_panic(context: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        let mut failure = Self::new(format!("{}: panicked with '{detail}'", context.into()));
        if let Some(stack) = PANIC_STACK.with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take())) {
            failure.stack = stack;
        }
        failure
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// The backtrace captured at construction, or at the panic site for panics.
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Messages of the cause chain, outermost first, excluding this failure.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.source();
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

/// A failure the caller is responsible for.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RequestFailure {
    status: StatusCode,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl RequestFailure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(status: StatusCode, message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self {
            cause: Some(cause.into()),
            ..Self::new(status, message)
        }
    }

    /// No registered pattern matches the path.
    pub fn unknown_route() -> Self {
        Self::new(StatusCode::UnprocessableEntity, "Invalid or no route supplied")
    }

    /// A pattern matches the path but none is bound to `method`.
    pub fn method_not_supported(method: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::MethodNotAllowed,
            format!("Specified route does not support {method}"),
        )
    }

    /// The body grew past `limit` bytes.
    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PayloadTooLarge,
            format!("Request body exceeds {limit} bytes"),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Any failure after classification.
#[derive(Debug, Error)]
pub enum ClassifiedError {
    #[error(transparent)]
    Operational(#[from] OperationalFailure),

    #[error(transparent)]
    Request(#[from] RequestFailure),
}

impl ClassifiedError {
    /// The status the caller receives for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ClassifiedError::Operational(_) => StatusCode::InternalServerError,
            ClassifiedError::Request(failure) => failure.status(),
        }
    }
}
