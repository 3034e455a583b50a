//! Merging request payloads with stored templates and service parameters

use std::sync::Arc;

use dfmail_core::{EmailTemplate, ServiceParameter, TemplateStore};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::EmailError;

/// Service parameters flattened into one name→value map.
///
/// Built once when the service is constructed; later rows with the same name
/// replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceParameters {
    values: Map<String, Value>,
}

impl ServiceParameters {
    pub fn from_rows(
        rows: impl IntoIterator<Item = ServiceParameter>,
        include_inactive: bool,
    ) -> Self {
        let values = rows
            .into_iter()
            .filter(|row| include_inactive || row.active)
            .filter(|row| !row.name.trim().is_empty())
            .map(|row| (row.name, row.value))
            .collect();
        Self { values }
    }

    /// Rows declared inline in a service's `config.parameters` array.
    pub fn rows_from_config(config: &Value) -> Result<Vec<ServiceParameter>, EmailError> {
        match config.get("parameters") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(rows @ Value::Array(_)) => serde_json::from_value(rows.clone()).map_err(|e| {
                EmailError::Configuration(format!("Invalid service parameters: {}", e))
            }),
            Some(_) => Err(EmailError::Configuration(
                "Service parameters must be a list of name/value pairs.".to_string(),
            )),
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How a request names its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKey {
    Name(String),
    Id(String),
}

impl TemplateKey {
    /// `template` wins over `template_id`; blank values are ignored.
    pub fn from_inputs(name: Option<&Value>, id: Option<&Value>) -> Option<Self> {
        if let Some(name) = name.and_then(non_blank) {
            return Some(TemplateKey::Name(name));
        }
        id.and_then(non_blank).map(TemplateKey::Id)
    }
}

fn non_blank(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct TemplateMerger {
    templates: Arc<dyn TemplateStore>,
    parameters: ServiceParameters,
}

impl TemplateMerger {
    pub fn new(templates: Arc<dyn TemplateStore>, parameters: ServiceParameters) -> Self {
        Self {
            templates,
            parameters,
        }
    }

    pub fn parameters(&self) -> &ServiceParameters {
        &self.parameters
    }

    async fn load(&self, key: &TemplateKey) -> Result<EmailTemplate, EmailError> {
        match key {
            TemplateKey::Name(name) => self
                .templates
                .find_by_name(name)
                .await?
                .ok_or_else(|| EmailError::NotFound(format!("Email Template '{}' not found", name))),
            TemplateKey::Id(raw) => {
                let not_found =
                    || EmailError::NotFound(format!("Email Template id '{}' not found", raw));
                let id = raw.parse::<i64>().map_err(|_| not_found())?;
                self.templates.find_by_id(id).await?.ok_or_else(not_found)
            }
        }
    }

    /// Build the data map for one send.
    ///
    /// Precedence, highest first: payload, template defaults, template
    /// content fields, service parameters.
    pub async fn merge(
        &self,
        payload: Map<String, Value>,
        key: Option<&TemplateKey>,
    ) -> Result<Map<String, Value>, EmailError> {
        let template = match key {
            Some(key) => Some(self.load(key).await?),
            None => None,
        };

        if template.is_none() && payload.is_empty() {
            return Err(EmailError::Validation("No valid data in request.".to_string()));
        }

        let Some(template) = template else {
            let mut data = self.parameters.values.clone();
            data.extend(payload);
            return Ok(data);
        };
        debug!("Merging request with email template {} ({})", template.name, template.id);

        let mut request = template.defaults.clone();
        request.extend(payload);

        let mut data = self.parameters.values.clone();
        data.extend(template.content_fields());
        data.extend(request);
        Ok(data)
    }
}
