//! Service types and their transport configuration
//!
//! A service's `config` arrives as a loose JSON object. It is validated once,
//! at construction, into one of the strict [`TransportConfig`] records.

use std::fmt;
use std::str::FromStr;

use dfmail_core::{mask_sensitive, ConfigField, FieldType, ServiceTypeInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::errors::EmailError;

pub const SENDMAIL_COMMAND_ENV: &str = "SENDMAIL_DEFAULT_COMMAND";
pub const DEFAULT_SENDMAIL_COMMAND: &str = "/usr/sbin/sendmail -bs";
pub const MAILGUN_DEFAULT_ENDPOINT: &str = "api.mailgun.net";
pub const MAILGUN_EU_ENDPOINT: &str = "api.eu.mailgun.net";

/// Email service types this plugin can instantiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[serde(rename = "local_email")]
    Local,
    #[serde(rename = "smtp_email")]
    Smtp,
    #[serde(rename = "mailgun_email")]
    Mailgun,
    #[serde(rename = "mandrill_email")]
    Mandrill,
    #[serde(rename = "sparkpost_email")]
    SparkPost,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ServiceType {
    type Err = EmailError;

    /// Accepts the stored type names and their short aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local_email" | "local" | "sendmail" => Ok(ServiceType::Local),
            "smtp_email" | "smtp" => Ok(ServiceType::Smtp),
            "mailgun_email" | "mailgun" => Ok(ServiceType::Mailgun),
            "mandrill_email" | "mandrill" => Ok(ServiceType::Mandrill),
            "sparkpost_email" | "sparkpost" => Ok(ServiceType::SparkPost),
            _ => Err(EmailError::Configuration(format!(
                "Unknown email service type: {}",
                s
            ))),
        }
    }
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        ServiceType::Local,
        ServiceType::Smtp,
        ServiceType::Mailgun,
        ServiceType::Mandrill,
        ServiceType::SparkPost,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceType::Local => "local_email",
            ServiceType::Smtp => "smtp_email",
            ServiceType::Mailgun => "mailgun_email",
            ServiceType::Mandrill => "mandrill_email",
            ServiceType::SparkPost => "sparkpost_email",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::Local => "Local Email Service",
            ServiceType::Smtp => "SMTP",
            ServiceType::Mailgun => "Mailgun",
            ServiceType::Mandrill => "Mandrill",
            ServiceType::SparkPost => "SparkPost",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ServiceType::Local => "Local email service using system configuration.",
            ServiceType::Smtp => "SMTP-based email service",
            ServiceType::Mailgun => "Mailgun email service",
            ServiceType::Mandrill => "Mandrill email service",
            ServiceType::SparkPost => "SparkPost email service",
        }
    }

    /// Listing entry for the host's service-type catalogue.
    pub fn info(&self) -> ServiceTypeInfo {
        ServiceTypeInfo {
            name: self.name().to_string(),
            label: self.label().to_string(),
            description: self.description().to_string(),
            group: "Email".to_string(),
            config_schema: self.config_schema(),
        }
    }

    /// Admin UI form fields for this service type, ending with `parameters`.
    pub fn config_schema(&self) -> Vec<ConfigField> {
        let mut fields = match self {
            ServiceType::Local => vec![ConfigField::new("command", "Command", FieldType::String)
                .default_value(DEFAULT_SENDMAIL_COMMAND)
                .description(
                    "Sendmail program to run. Falls back to the SENDMAIL_DEFAULT_COMMAND \
                     environment variable, then the system sendmail.",
                )],
            ServiceType::Smtp => vec![
                ConfigField::new("host", "Host", FieldType::String)
                    .required()
                    .description("SMTP server host name or IP address."),
                ConfigField::new("port", "Port", FieldType::Integer)
                    .required()
                    .default_value(587)
                    .description("SMTP server port, typically 25, 465 or 587."),
                ConfigField::new("encryption", "Encryption", FieldType::Picklist)
                    .default_value("tls")
                    .picklist([("TLS", "tls"), ("SSL", "ssl")])
                    .description(
                        "tls upgrades the connection with STARTTLS, ssl connects over TLS \
                         directly. Leave empty for opportunistic STARTTLS.",
                    ),
                ConfigField::new("username", "Username", FieldType::String)
                    .description("User name for SMTP authentication."),
                ConfigField::new("password", "Password", FieldType::Password)
                    .description("Password for SMTP authentication."),
            ],
            ServiceType::Mailgun => vec![
                ConfigField::new("domain", "Domain", FieldType::String)
                    .required()
                    .description("Your Mailgun domain name."),
                ConfigField::new("key", "API Key", FieldType::Password)
                    .required()
                    .description("Mailgun service API key."),
                ConfigField::new("region_endpoint", "Region Endpoint", FieldType::Picklist)
                    .not_null()
                    .default_value(MAILGUN_DEFAULT_ENDPOINT)
                    .picklist([("US", MAILGUN_DEFAULT_ENDPOINT), ("EU", MAILGUN_EU_ENDPOINT)])
                    .description("Mailgun API region endpoint."),
            ],
            ServiceType::Mandrill => vec![ConfigField::new("key", "API Key", FieldType::Password)
                .required()
                .description("Mandrill service API key.")],
            ServiceType::SparkPost => vec![
                ConfigField::new("key", "API Key", FieldType::Password)
                    .required()
                    .description("SparkPost service API key."),
                ConfigField::new("options", "Options", FieldType::Object).description(
                    "Extra transmission options merged into every request body. \
                     An `endpoint` entry overrides the API base URL.",
                ),
            ],
        };

        fields.push(parameters_field());
        fields
    }
}

fn parameters_field() -> ConfigField {
    ConfigField::new("parameters", "Parameters", FieldType::Array)
        .description(
            "Supply additional parameters to be replaced in the email body, \
             subject or recipient fields.",
        )
        .items(vec![
            ConfigField::new("name", "Name", FieldType::String).required(),
            ConfigField::new("value", "Value", FieldType::String),
            ConfigField::new("active", "Active", FieldType::Boolean)
                .not_null()
                .default_value(true),
        ])
}

/// SMTP connection security
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpEncryption {
    /// Plain connection upgraded with STARTTLS, which must succeed
    StartTls,
    /// TLS from the first byte
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub command: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub encryption: Option<SmtpEncryption>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SmtpConfig {
    /// Credentials, only when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MailgunConfig {
    pub domain: String,
    pub key: String,
    /// Host name (`api.eu.mailgun.net`) or full base URL
    pub region_endpoint: String,
}

impl fmt::Debug for MailgunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunConfig")
            .field("domain", &self.domain)
            .field("key", &mask_sensitive(&self.key))
            .field("region_endpoint", &self.region_endpoint)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MandrillConfig {
    pub key: String,
}

impl fmt::Debug for MandrillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MandrillConfig")
            .field("key", &mask_sensitive(&self.key))
            .finish()
    }
}

#[derive(Clone, PartialEq)]
pub struct SparkPostConfig {
    pub key: String,
    pub options: Map<String, Value>,
}

impl fmt::Debug for SparkPostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparkPostConfig")
            .field("key", &mask_sensitive(&self.key))
            .field("options", &self.options)
            .finish()
    }
}

/// Validated transport configuration, one variant per service type
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    Local(LocalConfig),
    Smtp(SmtpConfig),
    Mailgun(MailgunConfig),
    Mandrill(MandrillConfig),
    SparkPost(SparkPostConfig),
}

impl TransportConfig {
    /// Validate a raw service `config` object for `service_type`.
    pub fn from_service(service_type: ServiceType, config: &Value) -> Result<Self, EmailError> {
        let empty = Map::new();
        let config = match config {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(EmailError::Configuration(
                    "Service configuration must be an object.".to_string(),
                ))
            }
        };

        match service_type {
            ServiceType::Local => {
                let command = string_field(config, "command")
                    .or_else(|| {
                        std::env::var(SENDMAIL_COMMAND_ENV)
                            .ok()
                            .filter(|c| !c.trim().is_empty())
                    })
                    .unwrap_or_else(|| DEFAULT_SENDMAIL_COMMAND.to_string());
                Ok(TransportConfig::Local(LocalConfig { command }))
            }
            ServiceType::Smtp => {
                let host = string_field(config, "host").ok_or_else(|| {
                    EmailError::Configuration(
                        "Missing SMTP host. Check service configuration.".to_string(),
                    )
                })?;
                let port = port_field(config, "port")?.ok_or_else(|| {
                    EmailError::Configuration(
                        "Missing SMTP port. Check service configuration.".to_string(),
                    )
                })?;
                let encryption = match string_field(config, "encryption")
                    .map(|e| e.to_lowercase())
                    .as_deref()
                {
                    None | Some("none") => None,
                    Some("tls") | Some("starttls") => Some(SmtpEncryption::StartTls),
                    Some("ssl") => Some(SmtpEncryption::Implicit),
                    Some(other) => {
                        return Err(EmailError::Configuration(format!(
                            "Unsupported SMTP encryption '{}'. Use tls or ssl.",
                            other
                        )))
                    }
                };
                Ok(TransportConfig::Smtp(SmtpConfig {
                    host,
                    port,
                    encryption,
                    username: string_field(config, "username"),
                    password: string_field(config, "password"),
                }))
            }
            ServiceType::Mailgun => {
                match (string_field(config, "domain"), string_field(config, "key")) {
                    (Some(domain), Some(key)) => Ok(TransportConfig::Mailgun(MailgunConfig {
                        domain,
                        key,
                        region_endpoint: string_field(config, "region_endpoint")
                            .unwrap_or_else(|| MAILGUN_DEFAULT_ENDPOINT.to_string()),
                    })),
                    _ => Err(EmailError::Configuration(
                        "Missing one or more configuration for MailGun service.".to_string(),
                    )),
                }
            }
            ServiceType::Mandrill => {
                let key = string_field(config, "key").ok_or_else(|| {
                    EmailError::Configuration("Missing key for Mandrill service.".to_string())
                })?;
                Ok(TransportConfig::Mandrill(MandrillConfig { key }))
            }
            ServiceType::SparkPost => {
                let key = string_field(config, "key").ok_or_else(|| {
                    EmailError::Configuration("Missing key for SparkPost service.".to_string())
                })?;
                let options = match config.get("options") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(options)) => options.clone(),
                    Some(_) => {
                        return Err(EmailError::Configuration(
                            "SparkPost options must be an object.".to_string(),
                        ))
                    }
                };
                Ok(TransportConfig::SparkPost(SparkPostConfig { key, options }))
            }
        }
    }

    pub fn service_type(&self) -> ServiceType {
        match self {
            TransportConfig::Local(_) => ServiceType::Local,
            TransportConfig::Smtp(_) => ServiceType::Smtp,
            TransportConfig::Mailgun(_) => ServiceType::Mailgun,
            TransportConfig::Mandrill(_) => ServiceType::Mandrill,
            TransportConfig::SparkPost(_) => ServiceType::SparkPost,
        }
    }
}

/// Non-blank string value; numbers are accepted in their plain form.
fn string_field(config: &Map<String, Value>, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn port_field(config: &Map<String, Value>, key: &str) -> Result<Option<u16>, EmailError> {
    let Some(raw) = string_field(config, key) else {
        return Ok(None);
    };
    raw.parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .map(Some)
        .ok_or_else(|| EmailError::Configuration(format!("Invalid SMTP port '{}'.", raw)))
}
