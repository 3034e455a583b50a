//! SparkPost transmissions API transport

use async_trait::async_trait;
use lettre::Message;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use super::traits::{DeliveryResult, MailTransport};
use super::{envelope_recipients, read_provider_response};
use crate::config::{ServiceType, SparkPostConfig};
use crate::errors::EmailError;

const SPARKPOST_BASE_URL: &str = "https://api.sparkpost.com/api/v1";

pub struct SparkPostTransport {
    client: Client,
    key: String,
    base_url: String,
    /// Extra transmission fields merged into every request
    options: Map<String, Value>,
}

impl SparkPostTransport {
    /// An `endpoint` entry in the options replaces the API base URL.
    pub fn new(config: &SparkPostConfig) -> Self {
        let mut options = config.options.clone();
        let base_url = match options.remove("endpoint") {
            Some(Value::String(endpoint)) if !endpoint.trim().is_empty() => {
                endpoint.trim().trim_end_matches('/').to_string()
            }
            _ => SPARKPOST_BASE_URL.to_string(),
        };

        Self {
            client: Client::new(),
            key: config.key.clone(),
            base_url,
            options,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transmission(&self, message: &Message) -> Value {
        let recipients: Vec<Value> = envelope_recipients(message)
            .into_iter()
            .map(|email| json!({ "address": { "email": email } }))
            .collect();

        let mut body = self.options.clone();
        body.insert("recipients".to_string(), Value::Array(recipients));
        body.insert(
            "content".to_string(),
            json!({ "email_rfc822": String::from_utf8_lossy(&message.formatted()) }),
        );
        Value::Object(body)
    }
}

#[async_trait]
impl MailTransport for SparkPostTransport {
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError> {
        let body = self.transmission(message);
        debug!("Sending transmission via SparkPost at {}", self.base_url);

        let response = self
            .client
            .post(format!("{}/transmissions", self.base_url))
            .header(AUTHORIZATION, &self.key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("SparkPost request failed: {}", e);
                EmailError::Delivery(format!("Failed to send email via SparkPost: {}", e))
            })?;

        let body = read_provider_response("SparkPost", response).await?;
        Ok(DeliveryResult::ProviderResponse(body))
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::SparkPost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::tests::sample_message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(options: Value) -> SparkPostTransport {
        let Value::Object(options) = options else {
            panic!("options must be an object");
        };
        SparkPostTransport::new(&SparkPostConfig {
            key: "sp-key".to_string(),
            options,
        })
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(transport(json!({})).base_url(), SPARKPOST_BASE_URL);
        assert_eq!(
            transport(json!({"endpoint": "https://api.eu.sparkpost.com/api/v1/"})).base_url(),
            "https://api.eu.sparkpost.com/api/v1"
        );
    }

    #[test]
    fn test_options_are_merged_without_endpoint() {
        let transport = transport(json!({
            "endpoint": "http://localhost",
            "options": {"sandbox": true},
            "campaign_id": "welcome"
        }));
        let body = transport.transmission(&sample_message());

        assert_eq!(body["campaign_id"], "welcome");
        assert_eq!(body["options"]["sandbox"], true);
        assert!(body.get("endpoint").is_none());
        assert_eq!(body["recipients"][0]["address"]["email"], "a@x.com");
        assert!(body["content"]["email_rfc822"]
            .as_str()
            .unwrap()
            .contains("Subject: Hello"));
    }

    #[tokio::test]
    async fn test_send_transmission() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transmissions"))
            .and(header("authorization", "sp-key"))
            .and(body_partial_json(json!({
                "recipients": [{"address": {"email": "a@x.com"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": {"total_accepted_recipients": 1, "id": "11668787484950529"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = transport(json!({ "endpoint": mock_server.uri() }))
            .send(&sample_message())
            .await
            .unwrap();
        assert_eq!(result.count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_transmission() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": [{"message": "Forbidden."}]
            })))
            .mount(&mock_server)
            .await;

        let err = transport(json!({ "endpoint": mock_server.uri() }))
            .send(&sample_message())
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::Delivery(msg) if msg.contains("403")));
    }
}
