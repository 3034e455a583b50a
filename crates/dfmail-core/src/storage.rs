//! Internal calls to the host's file storage services

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ServiceResult;
use crate::utils::basename;

/// Options passed along with a storage `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageGetOptions {
    pub include_properties: bool,
    pub content: bool,
    pub is_base64: bool,
}

impl StorageGetOptions {
    /// File properties plus base64 content, the shape attachments need.
    pub fn file_with_content() -> Self {
        Self {
            include_properties: true,
            content: true,
            is_base64: true,
        }
    }
}

/// Result of an internal storage call, as the service would answer over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageResponse {
    pub status_code: u16,
    pub content: Value,
}

impl StorageResponse {
    pub fn ok(content: Value) -> Self {
        Self {
            status_code: 200,
            content,
        }
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            content: json!({"error": {"code": status_code, "message": message.into()}}),
        }
    }
}

#[async_trait]
pub trait StorageProxy: Send + Sync {
    async fn get(
        &self,
        service: &str,
        path: &str,
        options: StorageGetOptions,
    ) -> ServiceResult<StorageResponse>;
}

/// Storage services backed by local directories, one root per service name.
#[derive(Debug, Clone, Default)]
pub struct LocalStorageProxy {
    roots: HashMap<String, PathBuf>,
}

impl LocalStorageProxy {
    pub fn new(roots: HashMap<String, PathBuf>) -> Self {
        Self { roots }
    }

    pub fn with_root(mut self, service: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(service.into(), root.into());
        self
    }

    fn resolve(&self, root: &Path, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return None;
        }
        Some(root.join(relative))
    }
}

#[async_trait]
impl StorageProxy for LocalStorageProxy {
    async fn get(
        &self,
        service: &str,
        path: &str,
        options: StorageGetOptions,
    ) -> ServiceResult<StorageResponse> {
        let Some(root) = self.roots.get(service) else {
            return Ok(StorageResponse::error(
                404,
                format!("Service '{}' not found.", service),
            ));
        };
        let Some(full_path) = self.resolve(root, path) else {
            return Ok(StorageResponse::error(
                400,
                format!("Invalid file path '{}'.", path),
            ));
        };

        let not_found = || StorageResponse::error(404, format!("File '{}' not found.", path));
        let target = match canonical_within(root, &full_path).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                return Ok(StorageResponse::error(
                    400,
                    format!("Invalid file path '{}'.", path),
                ));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(not_found()),
            Err(e) => return Err(e.into()),
        };

        debug!("Reading storage file {} from service {}", path, service);
        let bytes = match tokio::fs::read(&target).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(not_found()),
            Err(e) => return Err(e.into()),
        };

        let mut content = json!({
            "path": path,
            "name": basename(path).unwrap_or(path),
        });
        if options.include_properties {
            content["size"] = json!(bytes.len());
        }
        if options.content {
            content["content"] = if options.is_base64 {
                json!(STANDARD.encode(&bytes))
            } else {
                json!(String::from_utf8_lossy(&bytes))
            };
        }

        Ok(StorageResponse::ok(content))
    }
}

/// Resolve symlinks and return the real path, or `None` when it lands
/// outside the root.
async fn canonical_within(root: &Path, full_path: &Path) -> std::io::Result<Option<PathBuf>> {
    let root = tokio::fs::canonicalize(root).await?;
    let target = tokio::fs::canonicalize(full_path).await?;
    Ok(target.starts_with(&root).then_some(target))
}
