//! A server with one plugin defined in code instead of a config file.
//!
//! ```text
//! curl http://127.0.0.1:3000/hello            -> hi
//! curl http://127.0.0.1:3000/greet?name=Ada   -> {"greeting":"Hello, Ada!"}
//! curl -X POST -d '{"n":1}' http://127.0.0.1:3000/echo
//! ```

use std::sync::Arc;

use serde_json::{json, Value};

use hookr::config::AppConfig;
use hookr::logger::Severity;
use hookr::notify::NullNotifier;
use hookr::plugin::{
    HandlerError, Params, Payload, Plugin, PluginContext, PluginModule, PluginRegistration, PluginRegistry, Reply,
};
use hookr::router::RouteDescriptor;
use hookr::service;

fn hello_plugin(ctx: &PluginContext) -> Result<Arc<dyn Plugin>, HandlerError> {
    let log_ctx = ctx.clone();

    let module = PluginModule::new()
        .callback("hello", |_: Params, _: Payload| -> Result<Reply, HandlerError> { Ok(Reply::text("hi")) })
        .callback("greet", |params: Params, _: Payload| -> Result<Reply, HandlerError> {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("World");
            Ok(Reply::json(json!({ "greeting": format!("Hello, {name}!") })))
        })
        .callback("echo", move |_: Params, payload: Payload| -> Result<Reply, HandlerError> {
            log_ctx.log(Severity::Info, "echoing payload", Some(&payload.to_value()));
            Ok(Reply::json(payload.to_value()))
        });

    Ok(Arc::new(module))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut registry = PluginRegistry::new();
    registry.register("plugins/hello", hello_plugin);

    let config = AppConfig {
        plugins: vec![PluginRegistration {
            name: "hello".to_string(),
            path: "plugins/hello".to_string(),
            routes: Some(vec![
                RouteDescriptor::new("GET", "/hello", "hello"),
                RouteDescriptor::new("GET", "/greet", "greet"),
                RouteDescriptor::new("POST", "/echo", "echo"),
            ]),
        }],
        ..AppConfig::default()
    };

    let server = service::build(config, registry, Arc::new(NullNotifier))?;
    server.start().await?;

    Ok(())
}
