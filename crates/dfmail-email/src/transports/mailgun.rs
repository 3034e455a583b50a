//! Mailgun HTTP API transport

use async_trait::async_trait;
use lettre::Message;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, error};

use super::traits::{DeliveryResult, MailTransport};
use super::{envelope_recipients, read_provider_response};
use crate::config::{MailgunConfig, ServiceType};
use crate::errors::EmailError;

/// Sends pre-built MIME messages through `POST /v3/{domain}/messages.mime`
pub struct MailgunTransport {
    client: Client,
    domain: String,
    key: String,
    base_url: String,
}

impl MailgunTransport {
    pub fn new(config: &MailgunConfig) -> Self {
        Self {
            client: Client::new(),
            domain: config.domain.clone(),
            key: config.key.clone(),
            base_url: Self::base_url(&config.region_endpoint),
        }
    }

    /// `api.eu.mailgun.net` becomes `https://api.eu.mailgun.net/v3`; a full
    /// URL is used as given, with `/v3` appended when missing.
    fn base_url(region_endpoint: &str) -> String {
        let endpoint = region_endpoint.trim().trim_end_matches('/');
        let root = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };

        if root.ends_with("/v3") {
            root
        } else {
            format!("{}/v3", root)
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages.mime",
            self.base_url,
            urlencoding::encode(&self.domain)
        )
    }
}

#[async_trait]
impl MailTransport for MailgunTransport {
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError> {
        let recipients = envelope_recipients(message);
        debug!(
            "Sending message via Mailgun domain {} to {} recipient(s)",
            self.domain,
            recipients.len()
        );

        let mime = Part::bytes(message.formatted())
            .file_name("message.mime")
            .mime_str("message/rfc822")
            .map_err(|e| EmailError::Internal(format!("Failed to build Mailgun request: {}", e)))?;
        let form = Form::new()
            .text("to", recipients.join(","))
            .part("message", mime);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth("api", Some(&self.key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("Mailgun request failed: {}", e);
                EmailError::Delivery(format!("Failed to send email via Mailgun: {}", e))
            })?;

        let body = read_provider_response("Mailgun", response).await?;
        Ok(DeliveryResult::ProviderResponse(body))
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Mailgun
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::tests::sample_message;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(region_endpoint: &str) -> MailgunTransport {
        MailgunTransport::new(&MailgunConfig {
            domain: "mg.example.com".to_string(),
            key: "key-123".to_string(),
            region_endpoint: region_endpoint.to_string(),
        })
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            MailgunTransport::base_url("api.mailgun.net"),
            "https://api.mailgun.net/v3"
        );
        assert_eq!(
            MailgunTransport::base_url("api.eu.mailgun.net/"),
            "https://api.eu.mailgun.net/v3"
        );
        assert_eq!(
            MailgunTransport::base_url("http://127.0.0.1:9000"),
            "http://127.0.0.1:9000/v3"
        );
        assert_eq!(
            MailgunTransport::base_url("https://proxy.local/v3"),
            "https://proxy.local/v3"
        );
    }

    #[tokio::test]
    async fn test_send_posts_mime_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages.mime"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "<20240101.1@mg.example.com>",
                "message": "Queued. Thank you."
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = transport(&mock_server.uri())
            .send(&sample_message())
            .await
            .unwrap();

        assert_eq!(result.count(), 1);
        let DeliveryResult::ProviderResponse(body) = result else {
            panic!("expected provider response");
        };
        assert_eq!(body["message"], "Queued. Thank you.");

        let requests = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"to\""));
        assert!(body.contains("a@x.com"));
        assert!(body.contains("Subject: Hello"));
    }

    #[tokio::test]
    async fn test_api_error_is_delivery_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&mock_server)
            .await;

        let err = transport(&mock_server.uri())
            .send(&sample_message())
            .await
            .unwrap_err();

        assert!(matches!(err, EmailError::Delivery(_)));
        assert!(err.to_string().contains("401"));
    }
}
