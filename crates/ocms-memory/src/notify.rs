use crate::error::NotifyError;
use serde::{Deserialize, Serialize};

/// A plain-text status or warning message addressed to the configured receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound channel for status and warning messages (usually mail).
///
/// Delivery is best-effort: the monitor logs failures and carries on.
pub trait StatusNotifier: Send + Sync {
    fn send(&self, message: &StatusMessage) -> Result<(), NotifyError>;
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn send(&self, message: &StatusMessage) -> Result<(), NotifyError> {
        if message.to.is_empty() {
            return Err(NotifyError::NoReceivers);
        }
        tracing::info!(
            target: "ocms.memory",
            from = %message.from,
            to = ?message.to,
            subject = %message.subject,
            "{}",
            message.body
        );
        Ok(())
    }
}
