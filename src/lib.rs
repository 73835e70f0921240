//! A small plugin-driven webhook server.
//!
//! Plugins are named sets of handlers. A TOML configuration binds request
//! paths to plugin callbacks through case-insensitive regular expressions;
//! the server reads each request, finds the first matching route and turns
//! the handler's result into an HTTP response.
//!
//! # Features
//!
//! - Regex route table with duplicate detection and static route parameters
//! - Handlers answering right away or through a deferred future
//! - Query strings decoded into parameters, JSON bodies detected automatically
//! - Two kinds of failure: caller mistakes get their own status code, internal
//!   failures get a bare 500 and are logged and mailed to operators
//! - Channel-based logging on top of the `log` facade
//!
//! # Examples
//!
//! ## Registering a plugin
//!
//! ```
//! use std::sync::Arc;
//!
//! use hookr::plugin::{HandlerError, Params, Payload, Plugin, PluginContext, PluginModule, PluginRegistry, Reply};
//!
//! let mut registry = PluginRegistry::new();
//! registry.register("plugins/hello", |_ctx: &PluginContext| -> Result<Arc<dyn Plugin>, HandlerError> {
//!     let module = PluginModule::new()
//!         .callback("hello", |_: Params, _: Payload| -> Result<Reply, HandlerError> {
//!             Ok(Reply::text("hi"))
//!         });
//!     Ok(Arc::new(module))
//! });
//! assert!(registry.contains("plugins/hello"));
//! ```
//!
//! ## Parsing a request head
//!
//! ```
//! use hookr::{parse_request, Method};
//!
//! let request = parse_request(b"GET /items?id=5 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
//! assert_eq!(request.method, Method::GET);
//! assert_eq!(request.path, "/items");
//! assert_eq!(request.query["id"], "5");
//! ```
//!
//! See the `demos` directory for a complete server.

pub mod config;
pub mod failure;
pub mod logger;
pub mod notify;
pub mod parser;
pub mod plugin;
pub mod router;
pub mod server;
pub mod service;

// Re-export commonly used items for convenience
pub use config::{load_config, AppConfig};
pub use failure::{ClassifiedError, ErrorReporter, OperationalFailure, RequestFailure};
pub use parser::{parse_request, Error as ParserError, HttpRequest, HttpVersion, Method, RequestMethod};
pub use router::Router;
pub use server::{Error as ServerError, HttpResponse, HttpServer, ServerConfig, StatusCode};
