//! Attachment resolution from uploads, remote URLs and storage services

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use dfmail_core::url_validation::validate_fetch_url;
use dfmail_core::{
    basename, LookupResolver, PermissionChecker, ServiceError, StorageGetOptions, StorageProxy,
};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::request::SendRequest;
use crate::attachment::Attachment;
use crate::errors::EmailError;

const URL_IMPORT_FAILED: &str = "Failed to import attachment file from url.";
const STORAGE_FAILED: &str = "Failed to get attachment file from storage service.";
const UPLOAD_FIELDS: [&str; 2] = ["file", "attachment"];

/// Largest remote file a URL import will download.
pub const MAX_IMPORT_BYTES: usize = 25 * 1024 * 1024;

pub struct AttachmentResolver {
    client: Client,
    permissions: Arc<dyn PermissionChecker>,
    storage: Arc<dyn StorageProxy>,
    lookups: Arc<dyn LookupResolver>,
    allow_private_urls: bool,
    max_import_bytes: usize,
}

impl AttachmentResolver {
    pub fn new(
        permissions: Arc<dyn PermissionChecker>,
        storage: Arc<dyn StorageProxy>,
        lookups: Arc<dyn LookupResolver>,
    ) -> Self {
        Self {
            client: Client::new(),
            permissions,
            storage,
            lookups,
            allow_private_urls: false,
            max_import_bytes: MAX_IMPORT_BYTES,
        }
    }

    /// Let URL imports reach private and loopback addresses.
    pub fn allow_private_urls(mut self, allow: bool) -> Self {
        self.allow_private_urls = allow;
        self
    }

    pub fn max_import_bytes(mut self, limit: usize) -> Self {
        self.max_import_bytes = limit;
        self
    }

    /// Collect attachments from every source, uploads first, then URLs, then
    /// storage services.
    ///
    /// `explicit` stands in for the request's `attachment` input when the
    /// request carries neither `import_url` nor `attachment`.
    pub async fn resolve(
        &self,
        request: &mut SendRequest,
        explicit: Option<&Value>,
    ) -> Result<Vec<Attachment>, EmailError> {
        let mut attachments = self.from_uploads(request)?;

        let source = request
            .input("import_url")
            .or_else(|| request.input("attachment"))
            .or(explicit)
            .cloned();

        if let Some(source) = source {
            attachments.extend(self.from_urls(&source).await?);
            attachments.extend(self.from_storage(&source, request).await?);
        }

        if !attachments.is_empty() {
            info!("Resolved {} attachment(s)", attachments.len());
        }
        Ok(attachments)
    }

    fn from_uploads(&self, request: &mut SendRequest) -> Result<Vec<Attachment>, EmailError> {
        let Some(field) = UPLOAD_FIELDS
            .into_iter()
            .find(|field| request.has_uploads(field))
        else {
            return Ok(Vec::new());
        };

        request
            .take_uploads(field)
            .into_iter()
            .map(|upload| Attachment::from_temp_path(upload.path, upload.file_name))
            .collect()
    }

    async fn from_urls(&self, source: &Value) -> Result<Vec<Attachment>, EmailError> {
        let urls: Vec<String> = match source {
            Value::String(list) => list
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let mut attachments = Vec::with_capacity(urls.len());
        for url in urls {
            let attachment = self
                .import_url(&url)
                .await
                .map_err(|e| EmailError::internal(URL_IMPORT_FAILED, e))?;
            attachments.push(attachment);
        }
        Ok(attachments)
    }

    async fn import_url(&self, raw: &str) -> Result<Attachment, String> {
        let replaced = self.lookups.replace_lookups(raw);
        let decoded = urlencoding::decode(&replaced).map_err(|e| e.to_string())?;
        let url = validate_fetch_url(decoded.trim(), self.allow_private_urls)
            .map_err(|e| e.to_string())?;

        debug!("Importing attachment from {}", url);
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        let too_large = || format!("Remote file exceeds {} bytes.", self.max_import_bytes);
        if response
            .content_length()
            .is_some_and(|len| len > self.max_import_bytes as u64)
        {
            return Err(too_large());
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            if bytes.len() + chunk.len() > self.max_import_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "attachment".to_string());

        Attachment::stage(&bytes, name)
            .await
            .map_err(|e| e.to_string())
    }

    async fn from_storage(
        &self,
        source: &Value,
        request: &SendRequest,
    ) -> Result<Vec<Attachment>, EmailError> {
        let descriptors: Vec<&Value> = match source {
            Value::Object(map) if map.contains_key("service") => vec![source],
            Value::Array(items) => items.iter().filter(|item| item.is_object()).collect(),
            _ => Vec::new(),
        };

        let mut attachments = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            attachments.push(self.fetch_from_storage(descriptor, request).await?);
        }
        Ok(attachments)
    }

    async fn fetch_from_storage(
        &self,
        descriptor: &Value,
        request: &SendRequest,
    ) -> Result<Attachment, EmailError> {
        let field = |key: &str| {
            descriptor
                .get(key)
                .and_then(Value::as_str)
                .map(|value| self.lookups.replace_lookups(value).trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let service = field("service");
        let path = field("path").or_else(|| field("file_path"));

        let (Some(service), Some(path)) = (service, path) else {
            return Err(EmailError::Validation(
                "No service name and file path provided in request.".to_string(),
            ));
        };

        if !self
            .permissions
            .can_read(&request.actor, &service, &path)
            .await
        {
            return Err(EmailError::Forbidden(format!(
                "You do not have enough privileges to access file: {} in service {}",
                path, service
            )));
        }

        debug!("Fetching attachment {} from storage service {}", path, service);
        let response = self
            .storage
            .get(&service, &path, StorageGetOptions::file_with_content())
            .await
            .map_err(|e| match e {
                ServiceError::NotFound { .. }
                | ServiceError::Validation { .. }
                | ServiceError::PermissionDenied { .. } => EmailError::from(e),
                other => EmailError::internal(STORAGE_FAILED, other),
            })?;

        if response.status_code != 200 {
            return Err(EmailError::internal(
                STORAGE_FAILED,
                format!(
                    "Could not retrieve attachment file: {} from storage service: {}",
                    path, service
                ),
            ));
        }

        let encoded = response
            .content
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| EmailError::internal(STORAGE_FAILED, e))?;

        let name = basename(&path).unwrap_or("attachment").to_string();
        Attachment::stage(&bytes, name).await
    }
}
