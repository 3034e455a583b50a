//! Plugin system for service registration and route configuration
//!
//! Each configured host service (one email service instance, for example) is
//! a plugin. Plugins pull their collaborators out of a type-keyed service
//! registry, publish per-instance state under their own name, and contribute
//! routes and OpenAPI paths that the [`PluginManager`] assembles into one
//! application.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::openapi::{ComponentsBuilder, OpenApi};

// Re-export for plugin implementations
pub use axum;
pub use utoipa;

/// Errors that can occur during plugin operations
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin registration failed for '{plugin_name}': {error}")]
    PluginRegistrationFailed { plugin_name: String, error: String },

    #[error("Service '{service_type}' is required but not registered")]
    ServiceNotFound { service_type: String },

    #[error("Plugin state '{plugin_name}' not found")]
    PluginStateNotFound { plugin_name: String },

    #[error("Plugin '{0}' is registered more than once")]
    DuplicatePlugin(String),

    #[error("Plugin configuration is invalid: {0}")]
    InvalidConfiguration(String),
}

/// Core plugin trait
pub trait ServicePlugin: Send + Sync {
    /// Unique name of this plugin instance; also its route prefix
    fn name(&self) -> &str;

    /// Build this plugin's services from the registry.
    ///
    /// Use `context.require_service::<T>()` for dependencies and
    /// `context.register_plugin_state(self.name(), state)` for per-instance state.
    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;

    /// HTTP routes for this plugin, or `None` when it serves no endpoints.
    fn configure_routes(&self, _context: &PluginContext) -> Option<PluginRoutes> {
        None
    }

    /// OpenAPI document for this plugin's endpoints.
    fn openapi_schema(&self) -> Option<OpenApi> {
        None
    }
}

/// Route configuration returned by plugins
pub struct PluginRoutes {
    pub router: Router,
}

impl PluginRoutes {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Type-keyed registry for dependency injection
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static + ?Sized>(&self, service: Arc<T>) {
        debug!("Registering service: {}", std::any::type_name::<T>());
        lock(&self.services).insert(TypeId::of::<T>(), Box::new(service));
    }

    pub fn get<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        lock(&self.services)
            .get(&TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn require<T: Send + Sync + 'static + ?Sized>(&self) -> Result<Arc<T>, PluginError> {
        self.get::<T>().ok_or_else(|| PluginError::ServiceNotFound {
            service_type: std::any::type_name::<T>().to_string(),
        })
    }
}

/// Per-plugin state, keyed by plugin name
#[derive(Default)]
pub struct PluginStateRegistry {
    states: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl PluginStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_state<T: Send + Sync + 'static + ?Sized>(&self, plugin_name: &str, state: Arc<T>) {
        debug!("Registering plugin state for: {}", plugin_name);
        lock(&self.states).insert(plugin_name.to_string(), Box::new(state));
    }

    pub fn get_state<T: Send + Sync + 'static + ?Sized>(&self, plugin_name: &str) -> Option<Arc<T>> {
        lock(&self.states)
            .get(plugin_name)
            .and_then(|any| any.downcast_ref::<Arc<T>>())
            .cloned()
    }
}

/// Read-only context handed to plugins when routes are built
pub struct PluginContext {
    service_registry: Arc<ServiceRegistry>,
    state_registry: Arc<PluginStateRegistry>,
}

impl PluginContext {
    pub fn get_service<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.service_registry.get::<T>()
    }

    pub fn get_plugin_state<T: Send + Sync + 'static + ?Sized>(
        &self,
        plugin_name: &str,
    ) -> Option<Arc<T>> {
        self.state_registry.get_state::<T>(plugin_name)
    }
}

/// Context used while plugins register their services
#[derive(Default)]
pub struct ServiceRegistrationContext {
    service_registry: Arc<ServiceRegistry>,
    state_registry: Arc<PluginStateRegistry>,
}

impl ServiceRegistrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service<T: Send + Sync + 'static + ?Sized>(&self, service: Arc<T>) {
        self.service_registry.register(service);
    }

    pub fn register_plugin_state<T: Send + Sync + 'static + ?Sized>(
        &self,
        plugin_name: &str,
        state: Arc<T>,
    ) {
        self.state_registry.register_state(plugin_name, state);
    }

    pub fn get_service<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.service_registry.get::<T>()
    }

    pub fn require_service<T: Send + Sync + 'static + ?Sized>(&self) -> Result<Arc<T>, PluginError> {
        self.service_registry.require::<T>()
    }

    pub fn create_plugin_context(&self) -> PluginContext {
        PluginContext {
            service_registry: self.service_registry.clone(),
            state_registry: self.state_registry.clone(),
        }
    }
}

/// Registers, initializes and assembles plugins into one application
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn ServicePlugin>>,
    context: ServiceRegistrationContext,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin (order matters for dependencies)
    pub fn register_plugin(&mut self, plugin: Box<dyn ServicePlugin>) {
        debug!("Registering plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Initialize all plugins in registration order
    pub async fn initialize_plugins(&mut self) -> Result<(), PluginError> {
        debug!("Initializing {} plugins", self.plugins.len());

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if !seen.insert(plugin.name().to_string()) {
                return Err(PluginError::DuplicatePlugin(plugin.name().to_string()));
            }
        }

        for plugin in &self.plugins {
            debug!("Initializing plugin: {}", plugin.name());

            plugin.register_services(&self.context).await.map_err(|e| {
                PluginError::PluginRegistrationFailed {
                    plugin_name: plugin.name().to_string(),
                    error: e.to_string(),
                }
            })?;

            debug!("Successfully initialized plugin: {}", plugin.name());
        }

        Ok(())
    }

    /// Build the application with every plugin's routes nested under `/api`
    pub fn build_application(&self) -> Router {
        debug!("Building application with {} plugins", self.plugins.len());

        let plugin_context = self.context.create_plugin_context();
        let mut api_router = Router::new();

        for plugin in &self.plugins {
            if let Some(plugin_routes) = plugin.configure_routes(&plugin_context) {
                debug!("Adding routes for plugin: {}", plugin.name());
                api_router = api_router.merge(plugin_routes.router);
            }
        }

        Router::new()
            .nest("/api", api_router)
            .layer(TraceLayer::new_for_http())
    }

    /// OpenAPI document merged from every plugin
    pub fn get_unified_openapi(&self) -> OpenApi {
        use utoipa::openapi::*;

        let mut combined = OpenApiBuilder::new()
            .info(
                InfoBuilder::new()
                    .title("DFMail")
                    .description(Some("Email services exposed as REST endpoints"))
                    .version(env!("CARGO_PKG_VERSION"))
                    .build(),
            )
            .servers(Some(vec![ServerBuilder::new()
                .url("/api")
                .description(Some("Base path for all service endpoints"))
                .build()]))
            .build();

        for plugin in &self.plugins {
            if let Some(plugin_openapi) = plugin.openapi_schema() {
                debug!("Merging OpenAPI schema for plugin: {}", plugin.name());
                merge_openapi(&mut combined, plugin_openapi);
            }
        }

        combined
    }

    /// Registration context, for host services registered before plugins
    pub fn service_context(&self) -> &ServiceRegistrationContext {
        &self.context
    }
}

fn merge_openapi(base: &mut OpenApi, plugin_schema: OpenApi) {
    for (path, path_item) in plugin_schema.paths.paths {
        base.paths.paths.insert(path, path_item);
    }

    if let Some(plugin_components) = plugin_schema.components {
        let base_components = base
            .components
            .get_or_insert_with(|| ComponentsBuilder::new().build());
        for (name, schema) in plugin_components.schemas {
            base_components.schemas.insert(name, schema);
        }
        for (name, response) in plugin_components.responses {
            base_components.responses.insert(name, response);
        }
    }

    if let Some(plugin_tags) = plugin_schema.tags {
        let base_tags = base.tags.get_or_insert_with(Vec::new);
        for tag in plugin_tags {
            if !base_tags.iter().any(|t| t.name == tag.name) {
                base_tags.push(tag);
            }
        }
    }
}
