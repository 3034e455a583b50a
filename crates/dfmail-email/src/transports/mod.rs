//! Mail transport abstractions and implementations

mod local;
mod mailgun;
mod mandrill;
mod smtp;
mod sparkpost;
mod traits;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;

use lettre::Message;
use serde_json::Value;
use tracing::{error, info};

pub use local::LocalTransport;
pub use mailgun::MailgunTransport;
pub use mandrill::MandrillTransport;
pub use smtp::SmtpTransport;
pub use sparkpost::SparkPostTransport;
pub use traits::*;

#[cfg(test)]
pub use mock::MockTransport;

use crate::config::TransportConfig;
use crate::errors::EmailError;

/// Build the one transport a service instance sends through.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn MailTransport>, EmailError> {
    let transport: Arc<dyn MailTransport> = match config {
        TransportConfig::Local(local) => Arc::new(LocalTransport::new(local)?),
        TransportConfig::Smtp(smtp) => Arc::new(SmtpTransport::new(smtp)?),
        TransportConfig::Mailgun(mailgun) => Arc::new(MailgunTransport::new(mailgun)),
        TransportConfig::Mandrill(mandrill) => Arc::new(MandrillTransport::new(mandrill)),
        TransportConfig::SparkPost(sparkpost) => Arc::new(SparkPostTransport::new(sparkpost)),
    };
    info!("Built {} transport", transport.service_type());
    Ok(transport)
}

/// Envelope recipients (to, cc and bcc) as plain addresses.
pub(crate) fn envelope_recipients(message: &Message) -> Vec<String> {
    message
        .envelope()
        .to()
        .iter()
        .map(|address| address.to_string())
        .collect()
}

/// Read a provider API response, turning non-2xx statuses into delivery errors.
pub(crate) async fn read_provider_response(
    provider: &str,
    response: reqwest::Response,
) -> Result<Value, EmailError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if !status.is_success() {
        error!("{} API error ({}): {}", provider, status, text);
        return Err(EmailError::Delivery(format!(
            "{} rejected message ({}): {}",
            provider, status, text
        )));
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
