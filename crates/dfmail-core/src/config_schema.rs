//! Declarative service configuration schema consumed by the host's admin UI

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Field types understood by the admin UI form renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Text,
    Password,
    Integer,
    Boolean,
    Picklist,
    Object,
    Array,
}

/// One selectable value of a picklist field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PicklistValue {
    pub label: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConfigField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allow_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<PicklistValue>>,
    /// Item layout for `array` fields
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub items: Option<Vec<ConfigField>>,
}

impl ConfigField {
    /// A nullable, optional field.
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            required: false,
            allow_null: true,
            default: None,
            description: None,
            values: None,
            items: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.allow_null = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn picklist<I, L, N>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (L, N)>,
        L: Into<String>,
        N: Into<String>,
    {
        self.values = Some(
            values
                .into_iter()
                .map(|(label, name)| PicklistValue {
                    label: label.into(),
                    name: name.into(),
                })
                .collect(),
        );
        self
    }

    pub fn items(mut self, items: Vec<ConfigField>) -> Self {
        self.items = Some(items);
        self
    }
}

/// A service type the plugin can instantiate, as listed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceTypeInfo {
    pub name: String,
    pub label: String,
    pub description: String,
    pub group: String,
    pub config_schema: Vec<ConfigField>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_serialization() {
        let field = ConfigField::new("region_endpoint", "Region Endpoint", FieldType::Picklist)
            .required()
            .default_value("api.mailgun.net")
            .picklist([("US", "api.mailgun.net"), ("EU", "api.eu.mailgun.net")]);

        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["type"], "picklist");
        assert_eq!(value["required"], true);
        assert_eq!(value["allow_null"], false);
        assert_eq!(value["default"], "api.mailgun.net");
        assert_eq!(value["values"][1], json!({"label": "EU", "name": "api.eu.mailgun.net"}));
        assert!(value.get("items").is_none());
    }
}
