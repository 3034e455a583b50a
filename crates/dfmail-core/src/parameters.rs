//! Service-scoped static parameters merged into every send

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ServiceResult;

/// A `name`/`value` pair configured on an email service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceParameter {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ServiceParameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[async_trait]
pub trait ServiceParameterStore: Send + Sync {
    /// All rows stored for the service, in storage order.
    async fn list_by_service_id(&self, service_id: i64) -> ServiceResult<Vec<ServiceParameter>>;
}

#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    parameters: RwLock<HashMap<i64, Vec<ServiceParameter>>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, service_id: i64, parameters: Vec<ServiceParameter>) {
        self.parameters.write().await.insert(service_id, parameters);
    }
}

#[async_trait]
impl ServiceParameterStore for InMemoryParameterStore {
    async fn list_by_service_id(&self, service_id: i64) -> ServiceResult<Vec<ServiceParameter>> {
        Ok(self
            .parameters
            .read()
            .await
            .get(&service_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_returns_rows_for_service_only() {
        let store = InMemoryParameterStore::new();
        store
            .set(
                3,
                vec![
                    ServiceParameter::new("company", "Acme"),
                    ServiceParameter::new("legacy", "x").inactive(),
                ],
            )
            .await;

        let rows = store.list_by_service_id(3).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[1].active);
        assert!(store.list_by_service_id(4).await.unwrap().is_empty());
    }

    #[test]
    fn test_active_defaults_to_true() {
        let parameter: ServiceParameter =
            serde_json::from_value(json!({"name": "company", "value": "Acme"})).unwrap();
        assert!(parameter.active);
    }
}
