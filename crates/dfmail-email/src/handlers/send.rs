//! Send handler

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use dfmail_core::error_builder::bad_request;
use dfmail_core::problemdetails::Problem;
use dfmail_core::Actor;
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::types::{AppState, EmailRequestBody, EmailResponse, SendQuery};
use crate::errors::EmailError;
use crate::services::{SendRequest, UploadedFile};

const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(send_email))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Send an email
///
/// Accepts JSON, form-encoded, flat XML or multipart bodies. Multipart file
/// parts named `file` or `attachment` are sent as attachments.
#[utoipa::path(
    tag = "Email",
    post,
    path = "/",
    params(SendQuery),
    request_body = EmailRequestBody,
    responses(
        (status = 200, description = "Email sent", body = EmailResponse),
        (status = 400, description = "Invalid request or address", body = dfmail_core::ProblemDetails),
        (status = 403, description = "Storage file not readable by caller", body = dfmail_core::ProblemDetails),
        (status = 404, description = "Email template not found", body = dfmail_core::ProblemDetails),
        (status = 500, description = "Internal server error", body = dfmail_core::ProblemDetails),
        (status = 502, description = "Mail transport rejected the message", body = dfmail_core::ProblemDetails),
        (status = 503, description = "Service is misconfigured", body = dfmail_core::ProblemDetails)
    )
)]
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
) -> Result<impl IntoResponse, Problem> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut send_request = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| bad_request().detail(e.body_text()).build())?;
        read_multipart(multipart).await?
    } else {
        let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| bad_request().detail(format!("Failed to read body: {}", e)).build())?;
        SendRequest::new(decode_body(&content_type, &body)?)
    };

    send_request.query = query
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    send_request.actor = Actor::from_headers(&headers);

    debug!(
        "Send request on {} with {} payload field(s), {} upload(s)",
        state.email_service.service_name(),
        send_request.payload.len(),
        send_request.uploads.len()
    );

    let count = state
        .email_service
        .send_request(send_request)
        .await
        .map_err(|e| {
            error!("Failed to send email: {}", e);
            Problem::from(e)
        })?;

    Ok(Json(EmailResponse { count }))
}

/// Decode a non-multipart body into payload fields.
pub(crate) fn decode_body(content_type: &str, body: &Bytes) -> Result<Map<String, Value>, Problem> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| bad_request().detail(format!("Invalid form body: {}", e)).build())?;
        let mut payload = Map::new();
        for (key, value) in pairs {
            push_field(&mut payload, key, Value::String(value));
        }
        return Ok(payload);
    }

    if content_type.contains("xml") {
        let text = std::str::from_utf8(body)
            .map_err(|e| bad_request().detail(format!("Invalid XML body: {}", e)).build())?;
        let fields: BTreeMap<String, String> = quick_xml::de::from_str(text)
            .map_err(|e| bad_request().detail(format!("Invalid XML body: {}", e)).build())?;
        return Ok(fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(payload)) => Ok(payload),
        Ok(_) => Err(bad_request()
            .detail("Request body must be a JSON object.")
            .build()),
        Err(e) => Err(bad_request()
            .detail(format!("Invalid JSON body: {}", e))
            .build()),
    }
}

/// Repeated keys collect into an array; a `[]` suffix is dropped.
fn push_field(payload: &mut Map<String, Value>, key: String, value: Value) {
    let key = key.trim_end_matches("[]").to_string();
    match payload.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            payload.insert(key, value);
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<SendRequest, Problem> {
    let mut request = SendRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request().detail(e.body_text()).build())?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request().detail(e.body_text()).build())?;
                let path = stage_upload(&bytes).await.map_err(Problem::from)?;
                request.uploads.push(UploadedFile {
                    field: name.trim_end_matches("[]").to_string(),
                    file_name: Some(file_name).filter(|n| !n.is_empty()),
                    path,
                });
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request().detail(e.body_text()).build())?;
                push_field(&mut request.payload, name, Value::String(text));
            }
        }
    }

    Ok(request)
}

async fn stage_upload(bytes: &[u8]) -> Result<tempfile::TempPath, EmailError> {
    let path = tempfile::Builder::new()
        .prefix("dfmail-upload-")
        .tempfile()
        .map_err(|e| EmailError::internal("Failed to stage uploaded file.", e))?
        .into_temp_path();
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| EmailError::internal("Failed to stage uploaded file.", e))?;
    Ok(path)
}
