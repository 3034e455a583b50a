//! Core types shared by the DFMail crates: the plugin system, RFC 7807
//! problem details and the narrow interfaces to host-platform collaborators.

pub mod config_schema;
pub mod error;
pub mod error_builder;
pub mod lookups;
pub mod parameters;
pub mod permissions;
pub mod plugin;
pub mod problemdetails;
pub mod storage;
pub mod templates;
pub mod url_validation;
pub mod utils;

pub use problemdetails::ProblemDetails;

// Re-export commonly used types
pub use config_schema::*;
pub use error::*;
pub use error_builder::*;
pub use lookups::{LookupResolver, StaticLookups};
pub use parameters::{InMemoryParameterStore, ServiceParameter, ServiceParameterStore};
pub use permissions::{Actor, PermissionChecker, StaticPermissionChecker};
pub use storage::{LocalStorageProxy, StorageGetOptions, StorageProxy, StorageResponse};
pub use templates::{EmailTemplate, InMemoryTemplateStore, TemplateStore};
pub use utils::*;

// Re-export external dependencies
pub use anyhow;
pub use async_trait;
pub use serde_json;
pub use tracing;
