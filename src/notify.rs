//! Outbound notifications.
//!
//! The core only composes messages and hands them off. Delivery (SMTP,
//! template rendering) belongs to whatever drains the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// A fully formed mail message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub from: Option<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    /// Template file used to render `text`, resolved by the delivery side.
    pub text_template: Option<String>,
    /// Template file used to render `html`, resolved by the delivery side.
    pub html_template: Option<String>,
    /// Data handed to the templates.
    pub data: Value,
}

/// Errors raised while handing a message off.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The outbound queue is full.
    #[error("Mail queue is full, dropping message [{0}]")]
    QueueFull(String),

    /// Nothing is draining the queue any more.
    #[error("Mail queue is closed, dropping message [{0}]")]
    Closed(String),
}

/// Accepts messages for asynchronous delivery.
///
/// `send` must not block: it only hands the message off.
pub trait Notifier: Send + Sync {
    fn send(&self, message: MailMessage) -> Result<(), NotifyError>;
}

/// A notifier that queues messages on a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<MailMessage>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end its deliverer drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MailMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, message: MailMessage) -> Result<(), NotifyError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => NotifyError::QueueFull(m.subject),
            mpsc::error::TrySendError::Closed(m) => NotifyError::Closed(m.subject),
        })
    }
}

/// A notifier for deployments without mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, _message: MailMessage) -> Result<(), NotifyError> {
        Ok(())
    }
}
