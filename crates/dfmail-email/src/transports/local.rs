//! Local sendmail transport

use async_trait::async_trait;
use lettre::{AsyncSendmailTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error};

use super::traits::{DeliveryResult, MailTransport};
use crate::config::{LocalConfig, ServiceType};
use crate::errors::EmailError;

const FORBIDDEN_FRAGMENTS: [&str; 10] = [";", "|", "&", "`", "$(", ">", "<", "\n", "\r", "\\"];

/// Hands messages to the local sendmail program
pub struct LocalTransport {
    program: String,
    transport: AsyncSendmailTransport<Tokio1Executor>,
}

impl LocalTransport {
    /// Build from a command line such as `/usr/sbin/sendmail -bs`.
    ///
    /// Only the program path is used; lettre supplies its own arguments.
    /// Command lines carrying shell control fragments are refused.
    pub fn new(config: &LocalConfig) -> Result<Self, EmailError> {
        if let Some(fragment) = FORBIDDEN_FRAGMENTS
            .iter()
            .find(|f| config.command.contains(**f))
        {
            return Err(EmailError::Configuration(format!(
                "Sendmail command contains a disallowed fragment '{}'.",
                fragment.escape_debug()
            )));
        }

        let program = config
            .command
            .split_whitespace()
            .next()
            .ok_or_else(|| EmailError::Configuration("Sendmail command is empty.".to_string()))?
            .to_string();

        debug!("Using sendmail program {}", program);
        Ok(Self {
            transport: AsyncSendmailTransport::<Tokio1Executor>::new_with_command(program.clone()),
            program,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl MailTransport for LocalTransport {
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError> {
        self.transport
            .send_raw(message.envelope(), &message.formatted())
            .await
            .map_err(|e| {
                error!("sendmail failed: {}", e);
                EmailError::Delivery(format!("Failed to send email with sendmail: {}", e))
            })?;
        Ok(DeliveryResult::Count(1))
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Local
    }
}
