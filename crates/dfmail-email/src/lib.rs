//! Email service plugin for DFMail
//!
//! Exposes "send an email" as a REST endpoint per configured service:
//! - Stored templates merged with request data and service parameters
//! - Attachments from uploads, remote URLs and storage services
//! - Transports: local sendmail, SMTP, Mailgun, Mandrill and SparkPost

pub mod addresses;
pub mod attachment;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod plugin;
pub mod render;
pub mod services;
pub mod transports;

// Re-export main types
pub use attachment::Attachment;
pub use config::{ServiceType, TransportConfig};
pub use errors::EmailError;
pub use handlers::{EmailApiDoc, EmailRequestBody, EmailResponse};
pub use plugin::{EmailPlugin, ServiceDefinition};
pub use services::{
    AttachmentResolver, EmailService, MailDefaults, SendRequest, ServiceParameters,
    TemplateMerger, UploadedFile,
};
pub use transports::{build_transport, DeliveryResult, MailTransport};
