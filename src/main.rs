//! `hookr`: serve the plugins named in a TOML configuration.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;

use hookr::notify::ChannelNotifier;
use hookr::plugin::{sample, PluginRegistry};
use hookr::{load_config, service};

/// Queued mail waiting for the delivery task.
const MAIL_QUEUE_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "hookr")]
#[command(about = "A plugin-driven webhook server", long_about = None)]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let (notifier, mut mail) = ChannelNotifier::new(MAIL_QUEUE_CAPACITY);

    // No transport is bundled; queued mail is written to the service log
    tokio::spawn(async move {
        while let Some(message) = mail.recv().await {
            info!(
                target: "hookr::service",
                "Mail to {}: {}\n{}",
                message.to.join(", "),
                message.subject,
                message.text.as_deref().unwrap_or_default()
            );
        }
    });

    let mut registry = PluginRegistry::new();
    sample::register(&mut registry);

    let server = service::build(config, registry, Arc::new(notifier))?;
    server.start().await?;

    Ok(())
}
