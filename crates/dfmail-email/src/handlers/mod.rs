//! HTTP handlers for the email service

mod send;
mod types;

pub use types::{AppState, EmailAddress, EmailRequestBody, EmailResponse, SendQuery};

use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;

/// Configure email routes
pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new().merge(send::routes())
}

#[derive(OpenApi)]
#[openapi(
    paths(send::send_email),
    components(
        schemas(
            types::EmailRequestBody,
            types::EmailResponse,
            types::EmailAddress,
            dfmail_core::ProblemDetails,
        )
    ),
    tags(
        (name = "Email", description = "Send email through a configured email service")
    )
)]
pub struct EmailApiDoc;
