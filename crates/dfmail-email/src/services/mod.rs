//! Email services

mod attachments;
mod email_service;
mod merge;
mod request;

pub use attachments::AttachmentResolver;
pub use email_service::{EmailService, MailDefaults};
pub use merge::{ServiceParameters, TemplateKey, TemplateMerger};
pub use request::{SendRequest, UploadedFile};
