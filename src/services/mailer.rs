use async_trait::async_trait;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound notification sink. Delivery failures never fail the request that
/// triggered them.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), AppError>;
}

/// Writes mail to the log instead of delivering it.
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), AppError> {
        tracing::info!(
            from = %self.sender,
            to = %message.to,
            subject = %message.subject,
            "mail queued"
        );
        tracing::debug!(body = %message.body, "mail body");
        Ok(())
    }
}
