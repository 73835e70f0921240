//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;

/// Errors that can occur while serving a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The request head did not end within the allowed size.
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// The request body is larger than the configured limit.
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// The body framing could not be decoded.
    #[error("Malformed body: {0}")]
    MalformedBody(String),

    /// The peer closed the connection part way through a request.
    #[error("Connection closed before the request was complete")]
    Incomplete,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
