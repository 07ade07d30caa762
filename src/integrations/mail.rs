use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Clone, Debug, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Failed to deliver mail: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError>;
}

/// Writes mail to the log instead of delivering it. Used until a real
/// transport is configured.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, body = %email.body, "Outbound email");
        Ok(())
    }
}
