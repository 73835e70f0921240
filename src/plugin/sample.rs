//! A small bundled plugin, handy for trying a configuration out.
//!
//! Registered under the module path `plugins/sample`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::logger::Severity;
use crate::notify::MailMessage;
use crate::plugin::{HandlerError, Params, Payload, Plugin, PluginContext, PluginModule, PluginRegistry, Reply};

/// Module path of the sample plugin.
pub const PATH: &str = "plugins/sample";

/// Add the sample plugin to `registry`.
pub fn register(registry: &mut PluginRegistry) {
    registry.register(PATH, build);
}

fn build(ctx: &PluginContext) -> Result<Arc<dyn Plugin>, HandlerError> {
    ctx.log(Severity::Info, "sample plugin initialized", None);

    let echo_ctx = ctx.clone();
    let userdata_ctx = ctx.clone();
    let mail_ctx = ctx.clone();

    let module = PluginModule::new()
        // Returns the `configParam` parameter, usually set as a static route param
        .callback("config_param", move |params: Params, payload: Payload| -> Result<Reply, HandlerError> {
            echo_ctx.log(
                Severity::Info,
                "Got a request for config_param",
                Some(&json!({ "params": params, "payload": payload.to_value() })),
            );
            Ok(Reply::json(params.get("configParam").cloned().unwrap_or(Value::Null)))
        })
        .callback("userdata", move |_params: Params, _payload: Payload| -> Result<Reply, HandlerError> {
            Ok(Reply::json(userdata_ctx.config().get("userdata").cloned().unwrap_or(Value::Null)))
        })
        .callback("sendmail", move |params: Params, _payload: Payload| -> Result<Reply, HandlerError> {
            let to = params
                .get("to")
                .and_then(Value::as_str)
                .ok_or("sendmail needs a `to` parameter")?;
            mail_ctx.sendmail(MailMessage {
                to: vec![to.to_string()],
                subject: "Test email".to_string(),
                text_template: Some("sample".to_string()),
                html_template: Some("sample".to_string()),
                data: Value::Object(params.clone()),
                ..MailMessage::default()
            });
            Ok(Reply::empty())
        })
        // Answers after `delay_ms` milliseconds (default 10)
        .callback("delayed", |params: Params, payload: Payload| -> Result<Reply, HandlerError> {
            let delay = params
                .get("delay_ms")
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(10);
            Ok(Reply::deferred(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, HandlerError>(json!({ "delayed_ms": delay, "payload": payload.to_value() }))
            }))
        });

    Ok(Arc::new(module))
}
