//! Mail transport trait definitions

use async_trait::async_trait;
use lettre::Message;
use serde_json::Value;

use crate::config::ServiceType;
use crate::errors::EmailError;

/// What a transport reports after handing a message off.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryResult {
    /// Number of messages the transport reports as sent
    Count(u64),
    /// Raw response body of an HTTP provider API
    ProviderResponse(Value),
}

impl DeliveryResult {
    /// Sent count; a provider response counts as one message.
    pub fn count(&self) -> u64 {
        match self {
            DeliveryResult::Count(count) => *count,
            DeliveryResult::ProviderResponse(_) => 1,
        }
    }
}

/// A configured way of delivering a fully built message
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver `message` to every envelope recipient
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError>;

    /// The service type this transport was built for
    fn service_type(&self) -> ServiceType;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_count() {
        assert_eq!(DeliveryResult::Count(3).count(), 3);
        assert_eq!(DeliveryResult::Count(0).count(), 0);
        assert_eq!(
            DeliveryResult::ProviderResponse(json!({"id": "<x@mg>"})).count(),
            1
        );
    }
}
