//! SMTP relay transport

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParametersBuilder};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error};

use super::traits::{DeliveryResult, MailTransport};
use crate::config::{ServiceType, SmtpConfig, SmtpEncryption};
use crate::errors::EmailError;

const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpTransport {
    host: String,
    port: u16,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Build the relay client. No connection is opened until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let tls_parameters = TlsParametersBuilder::new(config.host.clone())
            .build()
            .map_err(|e| {
                EmailError::Configuration(format!("Invalid TLS settings for SMTP host: {}", e))
            })?;

        let tls = match config.encryption {
            Some(SmtpEncryption::Implicit) => Tls::Wrapper(tls_parameters),
            Some(SmtpEncryption::StartTls) => Tls::Required(tls_parameters),
            None if config.port == IMPLICIT_TLS_PORT => Tls::Wrapper(tls_parameters),
            None => Tls::Opportunistic(tls_parameters),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls);

        if let Some((username, password)) = config.credentials() {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        debug!(
            "Configured SMTP transport for {}:{} (encryption: {:?}, auth: {})",
            config.host,
            config.port,
            config.encryption,
            config.credentials().is_some()
        );

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            mailer: builder.build(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError> {
        let response = self
            .mailer
            .send_raw(message.envelope(), &message.formatted())
            .await
            .map_err(|e| {
                error!("SMTP delivery to {} failed: {}", self.endpoint(), e);
                EmailError::Delivery(format!("Failed to send email via SMTP: {}", e))
            })?;

        debug!(
            "SMTP server {} accepted message: {}",
            self.endpoint(),
            response.message().collect::<Vec<_>>().join(" ")
        );
        Ok(DeliveryResult::Count(1))
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Smtp
    }
}
