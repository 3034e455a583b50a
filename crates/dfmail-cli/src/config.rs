//! Host configuration file
//!
//! One YAML document describes the platform collaborators (templates,
//! storage roots, permission rules, lookups, sender defaults) and the email
//! services to expose.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use dfmail_core::plugin::PluginManager;
use dfmail_core::{
    EmailTemplate, InMemoryTemplateStore, LocalStorageProxy, LookupResolver, PermissionChecker,
    StaticLookups, StaticPermissionChecker, StorageProxy, TemplateStore,
};
use dfmail_email::{EmailPlugin, MailDefaults, ServiceDefinition};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Sender used when neither the request nor the template names one
    #[serde(default)]
    pub mail: MailDefaults,
    #[serde(default)]
    pub lookups: HashMap<String, String>,
    #[serde(default)]
    pub templates: Vec<EmailTemplate>,
    /// Storage service name to local directory
    #[serde(default)]
    pub storage: HashMap<String, PathBuf>,
    #[serde(default)]
    pub permissions: StaticPermissionChecker,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl HostConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let config: HostConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.services.is_empty() {
            bail!("No email services configured");
        }

        let mut names = HashSet::new();
        for service in &self.services {
            let valid = !service.name.is_empty()
                && service
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                bail!(
                    "Service name '{}' must be non-empty and use only letters, digits, '-' or '_'",
                    service.name
                );
            }
            if !names.insert(service.name.as_str()) {
                bail!("Service name '{}' is used more than once", service.name);
            }
        }

        let mut ids = HashSet::new();
        for template in &self.templates {
            if !ids.insert(template.id) {
                bail!("Template id {} is used more than once", template.id);
            }
        }
        Ok(())
    }

    /// Plugin manager with collaborators and one plugin per service, not yet
    /// initialized.
    pub fn plugin_manager(&self) -> PluginManager {
        let mut manager = PluginManager::new();
        let context = manager.service_context();

        context.register_service::<dyn TemplateStore>(Arc::new(InMemoryTemplateStore::new(
            self.templates.iter().cloned(),
        )));
        context.register_service::<dyn StorageProxy>(Arc::new(LocalStorageProxy::new(
            self.storage.clone(),
        )));
        context.register_service::<dyn PermissionChecker>(Arc::new(self.permissions.clone()));
        context.register_service::<dyn LookupResolver>(Arc::new(StaticLookups::new(
            self.lookups.clone(),
        )));
        context.register_service(Arc::new(self.mail.clone()));
        debug!(
            "Registered {} template(s) and {} storage service(s)",
            self.templates.len(),
            self.storage.len()
        );

        for service in &self.services {
            manager.register_plugin(Box::new(EmailPlugin::new(service.clone())));
        }
        manager
    }
}
