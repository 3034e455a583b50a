//! Handler types for the email service

use std::sync::Arc;

use axum::http::StatusCode;
use dfmail_core::error_builder::{
    bad_gateway, bad_request, forbidden, internal_server_error, not_found, service_unavailable,
};
use dfmail_core::problemdetails::Problem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::errors::EmailError;
use crate::services::EmailService;

/// Application state for email handlers
pub struct AppState {
    pub email_service: Arc<EmailService>,
}

/// A recipient or sender given as separate name and address
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailAddress {
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
    #[schema(example = "jane@example.com")]
    pub email: String,
}

/// Send request body.
///
/// Address fields take a single address, a comma or semicolon separated
/// list (`Name <addr>` entries allowed), a list of strings or of
/// [`EmailAddress`] objects. Any extra key is available to `{{key}}`
/// placeholders in the subject and bodies.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EmailRequestBody {
    #[schema(value_type = Object, example = "jane@example.com")]
    pub to: Option<Value>,
    #[schema(value_type = Object)]
    pub cc: Option<Value>,
    #[schema(value_type = Object)]
    pub bcc: Option<Value>,
    #[schema(example = "Welcome, {{first_name}}")]
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub from_name: Option<String>,
    #[schema(example = "noreply@example.com")]
    pub from_email: Option<String>,
    pub reply_to_name: Option<String>,
    pub reply_to_email: Option<String>,
    /// URL(s) to download and attach
    #[schema(value_type = Object)]
    pub import_url: Option<Value>,
    /// URL list, or `{service, path}` storage file descriptor(s)
    #[schema(value_type = Object)]
    pub attachment: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailResponse {
    /// Number of messages the transport reports as sent
    #[schema(example = 1)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SendQuery {
    /// Name of a stored email template
    pub template: Option<String>,
    /// Id of a stored email template, used when `template` is absent
    pub template_id: Option<i64>,
    /// Attachment URL list, used when the body carries none
    pub attachment: Option<String>,
}

impl From<EmailError> for Problem {
    fn from(error: EmailError) -> Self {
        match error {
            EmailError::Validation(msg) => bad_request()
                .title("Validation Error")
                .detail(msg)
                .build(),
            EmailError::NotFound(msg) => not_found().detail(msg).build(),
            EmailError::Forbidden(msg) => forbidden().detail(msg).build(),
            EmailError::Configuration(msg) => service_unavailable()
                .title("Service Misconfigured")
                .detail(msg)
                .build(),
            EmailError::Delivery(msg) => bad_gateway().detail(msg).build(),
            EmailError::Internal(msg) => internal_server_error().detail(msg).build(),
        }
    }
}

impl EmailError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EmailError::Validation(_) => StatusCode::BAD_REQUEST,
            EmailError::NotFound(_) => StatusCode::NOT_FOUND,
            EmailError::Forbidden(_) => StatusCode::FORBIDDEN,
            EmailError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            EmailError::Delivery(_) => StatusCode::BAD_GATEWAY,
            EmailError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
