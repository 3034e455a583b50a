//! Email plugin: one configured email service instance

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::Router;
use dfmail_core::plugin::{
    PluginContext, PluginError, PluginRoutes, ServicePlugin, ServiceRegistrationContext,
};
use dfmail_core::{
    LookupResolver, PermissionChecker, ServiceParameterStore, StaticLookups, StorageProxy,
    TemplateStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use utoipa::openapi::OpenApi;
use utoipa::OpenApi as OpenApiTrait;

use crate::config::{ServiceType, TransportConfig};
use crate::handlers::{self, AppState, EmailApiDoc};
use crate::services::{
    AttachmentResolver, EmailService, MailDefaults, ServiceParameters, TemplateMerger,
};
use crate::transports::build_transport;

/// A configured email service, as the host stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: i64,
    /// Route prefix and registry key of the instance
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// Provider settings plus `parameters`, `include_inactive_parameters`
    /// and `allow_private_urls`
    #[serde(default)]
    pub config: Value,
}

impl ServiceDefinition {
    pub fn new(id: i64, name: impl Into<String>, service_type: ServiceType, config: Value) -> Self {
        Self {
            id,
            name: name.into(),
            service_type,
            config,
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.config
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Inactive parameter rows are merged unless switched off.
    pub fn include_inactive_parameters(&self) -> bool {
        self.flag("include_inactive_parameters", true)
    }

    pub fn allow_private_urls(&self) -> bool {
        self.flag("allow_private_urls", false)
    }
}

/// Email Plugin exposing `POST /{name}` for one service instance
pub struct EmailPlugin {
    definition: ServiceDefinition,
}

impl EmailPlugin {
    pub fn new(definition: ServiceDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    async fn build_service(
        &self,
        context: &ServiceRegistrationContext,
    ) -> Result<EmailService, PluginError> {
        let definition = &self.definition;
        let invalid = |e: crate::errors::EmailError| {
            PluginError::InvalidConfiguration(format!("{}: {}", definition.name, e))
        };

        let transport_config =
            TransportConfig::from_service(definition.service_type, &definition.config)
                .map_err(invalid)?;
        let transport = build_transport(&transport_config).map_err(invalid)?;

        let mut rows = ServiceParameters::rows_from_config(&definition.config).map_err(invalid)?;
        if let Some(store) = context.get_service::<dyn ServiceParameterStore>() {
            rows.extend(
                store
                    .list_by_service_id(definition.id)
                    .await
                    .map_err(|e| invalid(e.into()))?,
            );
        }
        let parameters =
            ServiceParameters::from_rows(rows, definition.include_inactive_parameters());
        debug!(
            "Service {} has {} parameter(s)",
            definition.name,
            parameters.len()
        );

        // Collaborators the host must provide
        let templates = context.require_service::<dyn TemplateStore>()?;
        let permissions = context.require_service::<dyn PermissionChecker>()?;
        let storage = context.require_service::<dyn StorageProxy>()?;

        let lookups = context
            .get_service::<dyn LookupResolver>()
            .unwrap_or_else(|| Arc::new(StaticLookups::default()));
        let defaults = context
            .get_service::<MailDefaults>()
            .map(|d| d.as_ref().clone())
            .unwrap_or_default();

        let resolver = AttachmentResolver::new(permissions, storage, lookups.clone())
            .allow_private_urls(definition.allow_private_urls());

        Ok(EmailService::new(
            definition.name.clone(),
            transport,
            TemplateMerger::new(templates, parameters),
            resolver,
            lookups,
            defaults,
        ))
    }
}

impl ServicePlugin for EmailPlugin {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(async move {
            let email_service = Arc::new(self.build_service(context).await?);
            context.register_plugin_state(self.name(), Arc::new(AppState { email_service }));

            info!(
                "Email service {} ({}) registered",
                self.definition.name, self.definition.service_type
            );
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<PluginRoutes> {
        let app_state = context.get_plugin_state::<AppState>(self.name())?;
        let routes = handlers::configure_routes().with_state(app_state);

        Some(PluginRoutes::new(
            Router::new().nest(&format!("/{}", self.name()), routes),
        ))
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        let mut doc = <EmailApiDoc as OpenApiTrait>::openapi();
        let prefix = format!("/{}", self.name());
        doc.paths.paths = std::mem::take(&mut doc.paths.paths)
            .into_iter()
            .map(|(path, item)| {
                let rebased = match path.as_str() {
                    "/" => prefix.clone(),
                    other => format!("{}{}", prefix, other),
                };
                (rebased, item)
            })
            .collect();
        Some(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfmail_core::plugin::PluginManager;
    use dfmail_core::{InMemoryTemplateStore, LocalStorageProxy, StaticPermissionChecker};
    use serde_json::json;

    fn register_collaborators(manager: &PluginManager) {
        let context = manager.service_context();
        context.register_service::<dyn TemplateStore>(Arc::new(InMemoryTemplateStore::default()));
        context.register_service::<dyn PermissionChecker>(Arc::new(
            StaticPermissionChecker::default(),
        ));
        context.register_service::<dyn StorageProxy>(Arc::new(LocalStorageProxy::default()));
    }

    fn smtp(name: &str, host: &str) -> EmailPlugin {
        EmailPlugin::new(ServiceDefinition::new(
            1,
            name,
            ServiceType::Smtp,
            json!({"host": host, "port": 587, "encryption": "tls"}),
        ))
    }

    #[test]
    fn test_definition_flags() {
        let definition = ServiceDefinition::new(1, "email", ServiceType::Local, json!({}));
        assert!(definition.include_inactive_parameters());
        assert!(!definition.allow_private_urls());

        let definition = ServiceDefinition::new(
            1,
            "email",
            ServiceType::Local,
            json!({"include_inactive_parameters": false, "allow_private_urls": true}),
        );
        assert!(!definition.include_inactive_parameters());
        assert!(definition.allow_private_urls());
    }

    #[test]
    fn test_definition_from_yaml_shape() {
        let definition: ServiceDefinition = serde_json::from_value(json!({
            "id": 3,
            "name": "mailer",
            "type": "mailgun_email",
            "config": {"domain": "mg.example.com", "key": "k"}
        }))
        .unwrap();
        assert_eq!(definition.service_type, ServiceType::Mailgun);
    }

    #[tokio::test]
    async fn test_registers_state_under_its_name() {
        let mut manager = PluginManager::new();
        register_collaborators(&manager);
        manager.register_plugin(Box::new(smtp("email", "smtp.example.com")));

        manager.initialize_plugins().await.unwrap();

        let context = manager.service_context().create_plugin_context();
        let state = context.get_plugin_state::<AppState>("email").unwrap();
        assert_eq!(state.email_service.service_name(), "email");
        assert_eq!(
            state.email_service.transport().service_type(),
            ServiceType::Smtp
        );
    }

    #[tokio::test]
    async fn test_blank_smtp_host_fails_registration() {
        let mut manager = PluginManager::new();
        register_collaborators(&manager);
        manager.register_plugin(Box::new(smtp("email", "")));

        let err = manager.initialize_plugins().await.unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing SMTP host. Check service configuration."));
    }

    #[tokio::test]
    async fn test_missing_collaborator_fails_registration() {
        let mut manager = PluginManager::new();
        manager.register_plugin(Box::new(smtp("email", "smtp.example.com")));

        let err = manager.initialize_plugins().await.unwrap_err();
        assert!(err.to_string().contains("TemplateStore"));
    }

    #[test]
    fn test_openapi_paths_are_rebased() {
        let doc = smtp("alerts", "smtp.example.com").openapi_schema().unwrap();
        assert!(doc.paths.paths.contains_key("/alerts"));
        assert!(!doc.paths.paths.contains_key("/"));
    }
}
