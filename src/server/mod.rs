//! HTTP front end: connection handling and the request lifecycle.
//!
//! The server owns no routing logic of its own. It reads one request per
//! connection, asks the [`Router`](crate::router::Router) for a result and
//! encodes it, classifying every failure on the way.

mod body;
mod config;
mod error;
mod http_server;
mod response;
mod tests;

// Re-export public items
pub use config::ServerConfig;
pub use error::Error;
pub use http_server::{AppState, HttpServer};
pub use response::{HttpResponse, StatusCode};
