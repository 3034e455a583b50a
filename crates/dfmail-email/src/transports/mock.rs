//! Mock mail transport for testing

use async_trait::async_trait;
use lettre::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ServiceType;
use crate::errors::EmailError;
use crate::transports::{DeliveryResult, MailTransport};

/// Mock transport recording every message it is handed
#[derive(Debug, Clone)]
pub struct MockTransport {
    /// Counter for tracking calls
    pub send_count: Arc<AtomicUsize>,
    /// Formatted messages, in send order
    pub sent: Arc<Mutex<Vec<String>>>,

    pub should_fail_send: bool,
    pub result: DeliveryResult,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            send_count: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            should_fail_send: false,
            result: DeliveryResult::Count(1),
        }
    }

    pub fn with_send_failure(mut self) -> Self {
        self.should_fail_send = true;
        self
    }

    pub fn with_result(mut self, result: DeliveryResult) -> Self {
        self.result = result;
        self
    }

    pub fn send_call_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_message(&self) -> Option<String> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(&self, message: &Message) -> Result<DeliveryResult, EmailError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_send {
            return Err(EmailError::Delivery("Mock send failure".to_string()));
        }

        self.sent
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&message.formatted()).into_owned());
        Ok(self.result.clone())
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Local
    }
}
