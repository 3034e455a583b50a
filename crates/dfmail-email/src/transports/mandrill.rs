//! Mandrill HTTP API transport

use async_trait::async_trait;
use lettre::Message;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::traits::{DeliveryResult, MailTransport};
use super::{envelope_recipients, read_provider_response};
use crate::config::{MandrillConfig, ServiceType};
use crate::errors::EmailError;

const MANDRILL_BASE_URL: &str = "https://mandrillapp.com/api/1.0";

#[derive(Debug, Serialize)]
struct MandrillSendRawRequest<'a> {
    key: &'a str,
    raw_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_email: Option<String>,
    to: Vec<String>,
    #[serde(rename = "async")]
    is_async: bool,
}

#[derive(Debug, Deserialize)]
struct MandrillRecipientStatus {
    email: String,
    status: String,
    #[serde(default)]
    reject_reason: Option<String>,
}

/// Sends pre-built MIME messages through `messages/send-raw.json`
pub struct MandrillTransport {
    client: Client,
    key: String,
    base_url: String,
}

impl MandrillTransport {
    pub fn new(config: &MandrillConfig) -> Self {
        Self::with_base_url(config, MANDRILL_BASE_URL)
    }

    pub fn with_base_url(config: &MandrillConfig, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            key: config.key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Fail when Mandrill turned down every recipient.
fn check_recipient_statuses(body: &Value) -> Result<(), EmailError> {
    let Ok(statuses) = serde_json::from_value::<Vec<MandrillRecipientStatus>>(body.clone()) else {
        return Ok(());
    };

    let refused: Vec<&MandrillRecipientStatus> = statuses
        .iter()
        .filter(|s| matches!(s.status.as_str(), "rejected" | "invalid"))
        .collect();

    if !statuses.is_empty() && refused.len() == statuses.len() {
        let reasons = refused
            .iter()
            .map(|s| {
                format!(
                    "{} ({})",
                    s.email,
                    s.reject_reason.as_deref().unwrap_or(s.status.as_str())
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Err(EmailError::Delivery(format!(
            "Mandrill rejected all recipients: {}",
            reasons
        )));
    }

    for status in &refused {
        warn!("Mandrill refused recipient {}: {}", status.email, status.status);
    }
    Ok(())
}

#[async_trait]
impl MailTransport for MandrillTransport {
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError> {
        let request = MandrillSendRawRequest {
            key: &self.key,
            raw_message: String::from_utf8_lossy(&message.formatted()).into_owned(),
            from_email: message.envelope().from().map(|a| a.to_string()),
            to: envelope_recipients(message),
            is_async: false,
        };
        debug!("Sending message via Mandrill to {} recipient(s)", request.to.len());

        let response = self
            .client
            .post(format!("{}/messages/send-raw.json", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Mandrill request failed: {}", e);
                EmailError::Delivery(format!("Failed to send email via Mandrill: {}", e))
            })?;

        let body = read_provider_response("Mandrill", response).await?;
        check_recipient_statuses(&body)?;
        Ok(DeliveryResult::ProviderResponse(body))
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Mandrill
    }
}
