//! HTTP request head parsing.
//!
//! Only the request line and headers are parsed here. The server reads and
//! bounds the body itself, since body handling depends on the size limit.

mod request;
mod method;
mod error;

// Re-export public items
pub use request::{HttpRequest, HttpVersion, parse_query, parse_request};
pub use method::{Method, RequestMethod};
pub use error::Error;
