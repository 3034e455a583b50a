//! Stored email templates and the store the email service reads them from

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::ServiceResult;

/// A named email template owned by the host platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub to: Option<Value>,
    #[serde(default)]
    pub cc: Option<Value>,
    #[serde(default)]
    pub bcc: Option<Value>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub attachment: Option<Value>,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub reply_to_name: Option<String>,
    #[serde(default)]
    pub reply_to_email: Option<String>,
    /// Values merged under the request payload when the template is used
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl EmailTemplate {
    /// Content fields that take part in a send, skipping unset ones.
    ///
    /// Bookkeeping fields (`id`, `name`, `description`, `defaults`) are not
    /// content and never reach the message data.
    pub fn content_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value.filter(|v| !v.is_null()) {
                fields.insert(key.to_string(), value);
            }
        };

        put("to", self.to.clone());
        put("cc", self.cc.clone());
        put("bcc", self.bcc.clone());
        put("subject", self.subject.clone().map(Value::String));
        put("attachment", self.attachment.clone());
        put("body_text", self.body_text.clone().map(Value::String));
        put("body_html", self.body_html.clone().map(Value::String));
        put("from_name", self.from_name.clone().map(Value::String));
        put("from_email", self.from_email.clone().map(Value::String));
        put("reply_to_name", self.reply_to_name.clone().map(Value::String));
        put("reply_to_email", self.reply_to_email.clone().map(Value::String));

        fields
    }
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<EmailTemplate>>;

    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<EmailTemplate>>;
}

/// Template store held in memory, used by the standalone host and tests.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<i64, EmailTemplate>>,
}

impl InMemoryTemplateStore {
    pub fn new(templates: impl IntoIterator<Item = EmailTemplate>) -> Self {
        Self {
            templates: RwLock::new(templates.into_iter().map(|t| (t.id, t)).collect()),
        }
    }

    pub async fn insert(&self, template: EmailTemplate) {
        self.templates.write().await.insert(template.id, template);
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn find_by_name(&self, name: &str) -> ServiceResult<Option<EmailTemplate>> {
        Ok(self
            .templates
            .read()
            .await
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<EmailTemplate>> {
        Ok(self.templates.read().await.get(&id).cloned())
    }
}
