//! Configuration schema definitions.
//!
//! All types derive Serde traits so the whole tree can be read from one TOML
//! file. Every section has defaults, so an empty file is a valid config.

use serde::Deserialize;
use serde_json::Value;

use crate::logger::LogConfig;
use crate::plugin::PluginRegistration;
use crate::server::ServerConfig;

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener and request limits.
    pub server: ServerConfig,

    /// Per-channel log switches.
    pub log: LogConfig,

    /// Error notification settings. Absent means no mail.
    pub mailer: Option<MailerConfig>,

    /// Opaque settings handed to every plugin.
    pub settings: Value,

    /// Plugins and their routes, registered in order.
    pub plugins: Vec<PluginRegistration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
            mailer: None,
            settings: Value::Object(Default::default()),
            plugins: Vec::new(),
        }
    }
}

/// The `[mailer]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// Only an explicit `false` turns notifications off.
    pub enabled: Option<bool>,

    /// Where operational failures are mailed.
    pub apperrors: Option<AppErrorMail>,
}

/// The `[mailer.apperrors]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppErrorMail {
    pub to: Vec<String>,
    pub from: Option<String>,
    /// Subject prefix, `"[hookr ERROR] "` when unset.
    pub prefix: Option<String>,
}
