//! Email service for composing and dispatching messages

use std::sync::Arc;

use dfmail_core::LookupResolver;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::attachments::AttachmentResolver;
use super::merge::{TemplateKey, TemplateMerger};
use super::request::SendRequest;
use crate::addresses::{mailbox, plain_addresses, sanitize, sanitize_required, sanitize_single};
use crate::attachment::Attachment;
use crate::errors::EmailError;
use crate::render::apply_data;
use crate::transports::MailTransport;

/// Platform-wide sender used when neither request nor template names one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailDefaults {
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
}

/// Service for sending emails through one configured transport
pub struct EmailService {
    service_name: String,
    transport: Arc<dyn MailTransport>,
    merger: TemplateMerger,
    resolver: AttachmentResolver,
    lookups: Arc<dyn LookupResolver>,
    defaults: MailDefaults,
}

impl EmailService {
    pub fn new(
        service_name: impl Into<String>,
        transport: Arc<dyn MailTransport>,
        merger: TemplateMerger,
        resolver: AttachmentResolver,
        lookups: Arc<dyn LookupResolver>,
        defaults: MailDefaults,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            transport,
            merger,
            resolver,
            lookups,
            defaults,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn transport(&self) -> &Arc<dyn MailTransport> {
        &self.transport
    }

    /// Handle one inbound send: merge the template, then dispatch.
    ///
    /// An empty body falls back to the query string as payload.
    pub async fn send_request(&self, mut request: SendRequest) -> Result<u64, EmailError> {
        let payload = if request.payload.is_empty() {
            request.query.clone()
        } else {
            request.payload.clone()
        };
        let template = TemplateKey::from_inputs(
            request.input("template"),
            request.input("template_id"),
        );

        let data = self.merger.merge(payload, template.as_ref()).await?;
        let text = data
            .get("body_text")
            .and_then(Value::as_str)
            .map(str::to_string);
        let html = data
            .get("body_html")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.dispatch(data, text, html, &mut request).await
    }

    /// Build the message from merged `data` and send it.
    ///
    /// Every staged attachment is read and deleted before the transport is
    /// called; attachments left unread on an error path are deleted on drop.
    pub async fn dispatch(
        &self,
        data: Map<String, Value>,
        text: Option<String>,
        html: Option<String>,
        request: &mut SendRequest,
    ) -> Result<u64, EmailError> {
        let text = text.map(|t| self.render(&t, &data));
        let html = html.map(|h| self.render(&h, &data));

        let mut attachments = self.resolver.resolve(request, None).await?;
        if attachments.is_empty() {
            if let Some(fallback) = data.get("attachment").filter(|v| !v.is_null()) {
                attachments = self.resolver.resolve(request, Some(fallback)).await?;
            }
        }

        let from = self.sender(&data)?;
        let to = sanitize_required(field(&data, "to"))?;
        let cc = sanitize(field(&data, "cc"))?;
        let bcc = sanitize(field(&data, "bcc"))?;
        let reply_to = sanitize_single(
            field(&data, "reply_to_email"),
            string_field(&data, "reply_to_name").as_deref(),
        )?;

        let mut builder = Message::builder().from(from);
        for recipient in &to {
            builder = builder.to(recipient.clone());
        }
        for recipient in &cc {
            builder = builder.cc(recipient.clone());
        }
        for recipient in &bcc {
            builder = builder.bcc(recipient.clone());
        }
        if let Some(reply_to) = reply_to {
            builder = builder.reply_to(reply_to);
        }
        if let Some(subject) = string_field(&data, "subject") {
            builder = builder.subject(self.render(&subject, &data));
        }

        let mut body = message_body(text, html);
        if !attachments.is_empty() {
            let mut mixed = MultiPart::mixed().multipart(body);
            for part in consume_all(attachments).await? {
                mixed = mixed.singlepart(part);
            }
            body = mixed;
        }
        let message = builder
            .multipart(body)
            .map_err(|e| EmailError::internal("Failed to build email message.", e))?;

        debug!(
            "Dispatching message via {} to {:?}",
            self.service_name,
            plain_addresses(&to)
        );
        let result = self.transport.send(&message).await?;
        let count = result.count();
        info!(
            "Service {} sent email to {} recipient(s), count {}",
            self.service_name,
            to.len() + cc.len() + bcc.len(),
            count
        );
        Ok(count)
    }

    /// Lookups first, then merged-data placeholders.
    fn render(&self, template: &str, data: &Map<String, Value>) -> String {
        apply_data(&self.lookups.replace_lookups(template), data)
    }

    /// The default sender name only applies together with the default address.
    fn sender(&self, data: &Map<String, Value>) -> Result<Mailbox, EmailError> {
        let from_name = string_field(data, "from_name");
        if let Some(sender) = sanitize_single(field(data, "from_email"), from_name.as_deref())? {
            return Ok(sender);
        }

        let email = self
            .defaults
            .from_address
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                EmailError::Configuration(
                    "No sender address available. Set from_email or the platform \
                     mail from address."
                        .to_string(),
                )
            })?;
        let name = from_name.or_else(|| self.defaults.from_name.clone());
        mailbox(email, name.as_deref())
    }
}

fn field<'a>(data: &'a Map<String, Value>, key: &str) -> &'a Value {
    data.get(key).unwrap_or(&Value::Null)
}

fn string_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Text, HTML or both as an alternative part.
fn message_body(text: Option<String>, html: Option<String>) -> MultiPart {
    match (text, html) {
        (Some(text), Some(html)) => MultiPart::alternative_plain_html(text, html),
        (None, Some(html)) => MultiPart::alternative().singlepart(SinglePart::html(html)),
        (text, None) => {
            MultiPart::alternative().singlepart(SinglePart::plain(text.unwrap_or_default()))
        }
    }
}

/// Read every attachment into a MIME part, deleting each staged file as it goes.
async fn consume_all(attachments: Vec<Attachment>) -> Result<Vec<SinglePart>, EmailError> {
    let mut parts = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let (name, content) = attachment.consume().await?;
        let mime = mime_guess::from_path(&name).first_or_octet_stream();
        let content_type = ContentType::parse(mime.as_ref())
            .map_err(|e| EmailError::internal("Invalid attachment content type.", e))?;
        parts.push(AttachmentPart::new(name).body(content, content_type));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::merge::ServiceParameters;
    use crate::services::request::UploadedFile;
    use crate::transports::{DeliveryResult, MockTransport};
    use dfmail_core::{
        EmailTemplate, InMemoryTemplateStore, LocalStorageProxy, ServiceParameter, StaticLookups,
        StaticPermissionChecker,
    };
    use serde_json::json;

    fn service_with(transport: MockTransport, defaults: MailDefaults) -> EmailService {
        let templates = InMemoryTemplateStore::new([EmailTemplate {
            id: 1,
            name: "welcome".to_string(),
            subject: Some("Welcome to {company}, {{first_name}}".to_string()),
            body_html: Some("<p>Hello {{first_name}}</p>".to_string()),
            to: Some(json!("ops@example.com")),
            ..Default::default()
        }]);
        let lookups: Arc<dyn LookupResolver> =
            Arc::new(StaticLookups::default().with("company", "Acme"));
        let merger = TemplateMerger::new(
            Arc::new(templates),
            ServiceParameters::from_rows(vec![ServiceParameter::new("signature", "The team")], true),
        );
        let resolver = AttachmentResolver::new(
            Arc::new(StaticPermissionChecker::default()),
            Arc::new(LocalStorageProxy::default()),
            lookups.clone(),
        );
        EmailService::new(
            "email",
            Arc::new(transport),
            merger,
            resolver,
            lookups,
            defaults,
        )
    }

    fn service(transport: MockTransport) -> EmailService {
        service_with(
            transport,
            MailDefaults {
                from_address: Some("noreply@example.com".to_string()),
                from_name: Some("Example".to_string()),
            },
        )
    }

    fn request(payload: Value) -> SendRequest {
        SendRequest::new(payload.as_object().cloned().unwrap())
    }

    fn upload(name: &str) -> UploadedFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"attached").unwrap();
        UploadedFile {
            field: "file".to_string(),
            file_name: Some(name.to_string()),
            path: file.into_temp_path(),
        }
    }

    #[tokio::test]
    async fn test_subject_substitution_and_count() {
        let transport = MockTransport::new();
        let service = service(transport.clone());

        let count = service
            .send_request(request(json!({
                "to": "a@x.com",
                "subject": "Hi {{user}}",
                "body_text": "Regards, {{signature}}",
                "user": "Bob"
            })))
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(transport.send_call_count(), 1);
        let sent = transport.last_message().unwrap();
        assert!(sent.contains("Subject: Hi Bob"));
        assert!(sent.contains("Regards, The team"));
        assert!(sent.contains("From: Example <noreply@example.com>"));
    }

    #[tokio::test]
    async fn test_template_with_lookups() {
        let transport = MockTransport::new();
        let service = service(transport.clone());

        let request = request(json!({"first_name": "Ann"}))
            .with_query(json!({"template": "welcome"}).as_object().cloned().unwrap());
        let count = service.send_request(request).await.unwrap();

        assert_eq!(count, 1);
        let sent = transport.last_message().unwrap();
        assert!(sent.contains("Subject: Welcome to Acme, Ann"));
        assert!(sent.contains("To: ops@example.com"));
        assert!(sent.contains("Hello Ann"));
    }

    #[tokio::test]
    async fn test_missing_template_sends_nothing() {
        let transport = MockTransport::new();
        let service = service(transport.clone());

        let err = service
            .send_request(
                SendRequest::default()
                    .with_query(json!({"template_id": "5"}).as_object().cloned().unwrap()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EmailError::NotFound(_)));
        assert_eq!(transport.send_call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_response_counts_as_one() {
        let transport =
            MockTransport::new().with_result(DeliveryResult::ProviderResponse(json!({"id": "x"})));
        let service = service(transport);

        let count = service
            .send_request(request(json!({"to": "a@x.com; b@x.com", "subject": "s"})))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_count_passes_through() {
        let service = service(MockTransport::new().with_result(DeliveryResult::Count(3)));
        let count = service
            .send_request(request(json!({"to": "a@x.com"})))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_missing_sender_is_configuration_error() {
        let transport = MockTransport::new();
        let service = service_with(transport.clone(), MailDefaults::default());

        let err = service
            .send_request(request(json!({"to": "a@x.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::Configuration(_)));
        assert_eq!(transport.send_call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_recipient_is_rejected() {
        let transport = MockTransport::new();
        let err = service(transport.clone())
            .send_request(request(json!({"subject": "no one"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid email - empty string.");
        assert_eq!(transport.send_call_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_to_cc_and_bcc() {
        let transport = MockTransport::new();
        service(transport.clone())
            .send_request(request(json!({
                "to": [{"name": "Ann", "email": "ann@x.com"}],
                "cc": "Bob <bob@x.com>",
                "bcc": ["carol@x.com"],
                "reply_to_email": "support@example.com",
                "reply_to_name": "Support",
                "from_email": "me@example.com"
            })))
            .await
            .unwrap();

        let sent = transport.last_message().unwrap();
        assert!(sent.contains("To: Ann <ann@x.com>"));
        assert!(sent.contains("Cc: Bob <bob@x.com>"));
        assert!(sent.contains("Reply-To: Support <support@example.com>"));
        assert!(sent.contains("From: me@example.com"));
        assert!(!sent.contains("carol@x.com"));
    }

    #[tokio::test]
    async fn test_sender_and_reply_to_accept_address_objects() {
        let transport = MockTransport::new();
        service(transport.clone())
            .send_request(request(json!({
                "to": "a@x.com",
                "from_email": {"name": "Me", "email": "me@example.com"},
                "from_name": "Ignored",
                "reply_to_email": [{"email": "help@example.com"}],
                "reply_to_name": "Helpdesk"
            })))
            .await
            .unwrap();

        let sent = transport.last_message().unwrap();
        assert!(sent.contains("From: Me <me@example.com>"));
        assert!(sent.contains("Reply-To: Helpdesk <help@example.com>"));
        assert!(!sent.contains("noreply@example.com"));
    }

    #[tokio::test]
    async fn test_invalid_sender_or_reply_to_is_rejected() {
        let cases = [
            json!({"to": "a@x.com", "reply_to_email": 42}),
            json!({"to": "a@x.com", "reply_to_email": {"name": "No Address"}}),
            json!({"to": "a@x.com", "from_email": true}),
            json!({"to": "a@x.com", "from_email": ["one@x.com", "two@x.com"]}),
            json!({"to": "a@x.com", "from_email": "not-an-address"}),
        ];
        for payload in cases {
            let transport = MockTransport::new();
            let err = service(transport.clone())
                .send_request(request(payload.clone()))
                .await
                .unwrap_err();
            assert!(matches!(err, EmailError::Validation(_)), "{}", payload);
            assert_eq!(transport.send_call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_uploaded_attachment_is_sent_and_deleted() {
        let transport = MockTransport::new();
        let upload = upload("notes.txt");
        let staged = upload.path.to_path_buf();

        service(transport.clone())
            .send_request(
                request(json!({"to": "a@x.com", "body_text": "see attached"})).with_upload(upload),
            )
            .await
            .unwrap();

        assert!(!staged.exists());
        let sent = transport.last_message().unwrap();
        assert!(sent.contains("filename=\"notes.txt\""));
        assert!(sent.contains("Content-Type: text/plain"));
    }

    #[tokio::test]
    async fn test_staged_files_removed_when_send_fails() {
        let transport = MockTransport::new().with_send_failure();
        let upload = upload("notes.txt");
        let staged = upload.path.to_path_buf();

        let err = service(transport)
            .send_request(request(json!({"to": "a@x.com"})).with_upload(upload))
            .await
            .unwrap_err();

        assert!(matches!(err, EmailError::Delivery(_)));
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_staged_files_removed_when_validation_fails() {
        let transport = MockTransport::new();
        let upload = upload("notes.txt");
        let staged = upload.path.to_path_buf();

        let err = service(transport.clone())
            .send_request(request(json!({"to": "not-an-address"})).with_upload(upload))
            .await
            .unwrap_err();

        assert!(matches!(err, EmailError::Validation(_)));
        assert!(!staged.exists());
        assert_eq!(transport.send_call_count(), 0);
    }

    #[test]
    fn test_message_body_shapes() {
        let both = message_body(Some("t".to_string()), Some("<b>h</b>".to_string()));
        let formatted = String::from_utf8_lossy(&both.formatted()).into_owned();
        assert!(formatted.contains("text/plain"));
        assert!(formatted.contains("text/html"));

        let empty = message_body(None, None);
        let formatted = String::from_utf8_lossy(&empty.formatted()).into_owned();
        assert!(formatted.contains("text/plain"));
    }
}
