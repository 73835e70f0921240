//! Turning a configuration into a ready-to-start server.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::failure::{ErrorReporter, OperationalFailure};
use crate::logger::{Channel, Logger};
use crate::notify::Notifier;
use crate::plugin::{PluginContext, PluginLoader, PluginRegistry};
use crate::router::Router;
use crate::server::HttpServer;

/// Wire logger, reporter, plugins and router together.
///
/// Every configured plugin is registered before this returns; a registration
/// failure is reported and aborts startup.
pub fn build(config: AppConfig, registry: PluginRegistry, notifier: Arc<dyn Notifier>) -> Result<HttpServer, OperationalFailure> {
    let logger = Logger::new(&config.log);
    let reporter = Arc::new(ErrorReporter::new(
        logger.clone(),
        Arc::clone(&notifier),
        config.mailer.clone(),
    ));

    let context = PluginContext::new(config.settings.clone(), logger.clone(), notifier, Arc::clone(&reporter));
    let mut router = Router::new(PluginLoader::new(registry, context), logger.clone());

    if let Err(failure) = router.register_all(&config.plugins) {
        reporter.report(&failure);
        return Err(failure);
    }

    logger.info(
        Channel::Service,
        format!(
            "Registered {} routes from {} plugins",
            router.routes().len(),
            router.plugins().len()
        ),
    );

    Ok(HttpServer::new(config.server, Arc::new(router), reporter))
}
