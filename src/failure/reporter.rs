//! Escalation of operational failures to operators.

use std::sync::Arc;

use serde_json::json;

use crate::config::MailerConfig;
use crate::failure::OperationalFailure;
use crate::logger::{Channel, Logger, Severity};
use crate::notify::{MailMessage, Notifier};

const DEFAULT_SUBJECT_PREFIX: &str = "[hookr ERROR] ";

/// Logs operational failures and, when configured, mails them to operators.
///
/// Reporting never fails: a notifier error is logged and swallowed.
pub struct ErrorReporter {
    logger: Logger,
    notifier: Arc<dyn Notifier>,
    mailer: Option<MailerConfig>,
}

impl ErrorReporter {
    pub fn new(logger: Logger, notifier: Arc<dyn Notifier>, mailer: Option<MailerConfig>) -> Self {
        Self {
            logger,
            notifier,
            mailer,
        }
    }

    /// Record `failure` on the service channel and escalate it.
    pub fn report(&self, failure: &OperationalFailure) {
        self.logger.log(
            Channel::Service,
            Severity::Error,
            failure.message(),
            Some(&json!({
                "causes": failure.cause_chain(),
                "stack": failure.stack(),
            })),
        );

        let Some(message) = self.compose(failure) else {
            return;
        };

        if let Err(e) = self.notifier.send(message) {
            // Mail is broken; the log is all that is left
            self.logger.log(
                Channel::Service,
                Severity::Error,
                format!("Unable to send error notification: {e}"),
                Some(&json!({ "failure": failure.message() })),
            );
        }
    }

    /// Build the notification for `failure`, or `None` when mail is off.
    ///
    /// Mail goes out when an `apperrors` section exists, unless the mailer is
    /// explicitly disabled.
    pub fn compose(&self, failure: &OperationalFailure) -> Option<MailMessage> {
        let mailer = self.mailer.as_ref()?;
        if mailer.enabled == Some(false) {
            return None;
        }
        let target = mailer.apperrors.as_ref()?;

        let mut body = format!(
            "Error:\n\n{}\n\nStack Trace:\n\n{}",
            failure.message(),
            failure.stack()
        );
        if let Some(cause) = failure.cause() {
            body.push_str(&format!(
                "\n\nInner Error:\n\n{cause:#?}\n\n{}",
                failure.cause_chain().join("\n")
            ));
        }

        let prefix = target.prefix.as_deref().unwrap_or(DEFAULT_SUBJECT_PREFIX);
        Some(MailMessage {
            to: target.to.clone(),
            from: target.from.clone(),
            subject: format!("{prefix}{}", failure.message()),
            text: Some(body),
            ..MailMessage::default()
        })
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("logger", &self.logger)
            .field("mailer", &self.mailer)
            .finish_non_exhaustive()
    }
}
