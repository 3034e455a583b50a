//! Locally staged attachment files

use std::path::Path;

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::errors::EmailError;

/// A staged file plus the name it is sent under.
///
/// The attachment exclusively owns its file. [`Attachment::consume`] reads
/// and deletes it; dropping an unconsumed attachment deletes it as well.
#[derive(Debug)]
pub struct Attachment {
    path: TempPath,
    name: String,
}

impl Attachment {
    /// Take ownership of an already staged file.
    ///
    /// The name defaults to the file's own name when none is given.
    pub fn from_temp_path(path: TempPath, name: Option<String>) -> Result<Self, EmailError> {
        if !path.is_file() {
            return Err(EmailError::Internal(format!(
                "Invalid file path provided from attachment - {}",
                path.display()
            )));
        }

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "attachment".to_string());

        Ok(Self { path, name })
    }

    /// Write `bytes` to a fresh temp file and wrap it.
    pub async fn stage(bytes: &[u8], name: impl Into<String>) -> Result<Self, EmailError> {
        let file = tempfile::Builder::new()
            .prefix("dfmail-attachment-")
            .tempfile()
            .map_err(|e| EmailError::internal("Failed to stage attachment.", e))?;
        let path = file.into_temp_path();

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EmailError::internal("Failed to stage attachment.", e))?;

        let attachment = Self::from_temp_path(path, Some(name.into()))?;
        debug!(
            "Staged attachment {} ({} bytes) at {}",
            attachment.name,
            bytes.len(),
            attachment.path().display()
        );
        Ok(attachment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the content and delete the backing file.
    ///
    /// The file is removed whether or not the read succeeds.
    pub async fn consume(self) -> Result<(String, Vec<u8>), EmailError> {
        let Self { path, name } = self;
        let content = tokio::fs::read(&path).await;

        if let Err(e) = path.close() {
            warn!("Failed to delete staged attachment {}: {}", name, e);
        }

        let content =
            content.map_err(|e| EmailError::internal("Failed to read attachment file.", e))?;
        Ok((name, content))
    }
}
