//! The decoded inbound send request

use dfmail_core::Actor;
use serde_json::{Map, Value};
use tempfile::TempPath;

/// A file part received in a multipart body, already staged on disk.
#[derive(Debug)]
pub struct UploadedFile {
    /// Form field the file was sent under
    pub field: String,
    pub file_name: Option<String>,
    pub path: TempPath,
}

#[derive(Debug, Default)]
pub struct SendRequest {
    pub query: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub uploads: Vec<UploadedFile>,
    pub actor: Actor,
}

impl SendRequest {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_upload(mut self, upload: UploadedFile) -> Self {
        self.uploads.push(upload);
        self
    }

    /// A request input, checking the body before the query string.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.payload
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.query.get(key).filter(|v| !v.is_null()))
    }

    /// Take the uploads sent under `field`, leaving the rest in place.
    pub fn take_uploads(&mut self, field: &str) -> Vec<UploadedFile> {
        let (taken, kept) = std::mem::take(&mut self.uploads)
            .into_iter()
            .partition(|upload| upload.field == field);
        self.uploads = kept;
        taken
    }

    pub fn has_uploads(&self, field: &str) -> bool {
        self.uploads.iter().any(|upload| upload.field == field)
    }
}
