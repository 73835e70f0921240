//! Channel-based logging on top of the `log` facade.
//!
//! Every channel logs under its own target (`hookr::service`, `hookr::router`,
//! `hookr::plugins`, `hookr::requests`) so the installed backend can filter
//! them independently. A channel switched off in the configuration drops its
//! records before they reach the backend.

use std::fmt;
use std::sync::Arc;

use log::Level;
use serde::Deserialize;
use serde_json::Value;

/// The four log channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Service,
    Router,
    Plugins,
    Requests,
}

impl Channel {
    /// The `log` target for this channel.
    pub fn target(&self) -> &'static str {
        match self {
            Channel::Service => "hookr::service",
            Channel::Router => "hookr::router",
            Channel::Plugins => "hookr::plugins",
            Channel::Requests => "hookr::requests",
        }
    }

    fn index(&self) -> usize {
        match self {
            Channel::Service => 0,
            Channel::Router => 1,
            Channel::Plugins => 2,
            Channel::Requests => 3,
        }
    }
}

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl From<Severity> for Level {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => Level::Info,
            Severity::Warn => Level::Warn,
            Severity::Error => Level::Error,
        }
    }
}

/// Per-channel switch as it appears in the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// The `[log]` section of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub service: ChannelConfig,
    pub router: ChannelConfig,
    pub plugins: ChannelConfig,
    pub requests: ChannelConfig,
}

/// Cheap-to-clone handle used by every component that logs.
#[derive(Clone)]
pub struct Logger {
    enabled: Arc<[bool; 4]>,
}

impl Logger {
    /// Create a logger honouring the per-channel switches.
    pub fn new(config: &LogConfig) -> Self {
        Self {
            enabled: Arc::new([
                config.service.enabled,
                config.router.enabled,
                config.plugins.enabled,
                config.requests.enabled,
            ]),
        }
    }

    /// Whether records on `channel` are emitted at all.
    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.enabled[channel.index()]
    }

    /// Log `message` on `channel`, with optional structured data appended as JSON.
    pub fn log(&self, channel: Channel, severity: Severity, message: impl fmt::Display, data: Option<&Value>) {
        if !self.is_enabled(channel) {
            return;
        }

        let level = Level::from(severity);
        match data {
            Some(data) => log::log!(target: channel.target(), level, "{message} {data}"),
            None => log::log!(target: channel.target(), level, "{message}"),
        }
    }

    pub fn info(&self, channel: Channel, message: impl fmt::Display) {
        self.log(channel, Severity::Info, message, None);
    }

    pub fn warn(&self, channel: Channel, message: impl fmt::Display) {
        self.log(channel, Severity::Warn, message, None);
    }

    pub fn error(&self, channel: Channel, message: impl fmt::Display) {
        self.log(channel, Severity::Error, message, None);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(&LogConfig::default())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("enabled", &self.enabled).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_default_to_enabled() {
        let logger = Logger::default();
        assert!(logger.is_enabled(Channel::Service));
        assert!(logger.is_enabled(Channel::Requests));
    }

    #[test]
    fn disabled_channel_is_reported() {
        let config: LogConfig = toml::from_str("[requests]\nenabled = false\n").unwrap();
        let logger = Logger::new(&config);
        assert!(!logger.is_enabled(Channel::Requests));
        assert!(logger.is_enabled(Channel::Router));

        // Must be a silent no-op
        logger.log(Channel::Requests, Severity::Error, "dropped", None);
    }

    #[test]
    fn severity_maps_to_log_level() {
        assert_eq!(Level::from(Severity::Warn), Level::Warn);
        let severity: Severity = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(severity, Severity::Error);
    }
}
