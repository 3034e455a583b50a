//! Caller identity and read-permission checks on storage services

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

pub const API_KEY_HEADER: &str = "x-dreamfactory-api-key";
pub const SESSION_TOKEN_HEADER: &str = "x-dreamfactory-session-token";

/// Who is making the request, as far as the host has told us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub api_key: Option<String>,
    pub session_token: Option<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            api_key: read(API_KEY_HEADER),
            session_token: read(SESSION_TOKEN_HEADER),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.api_key.is_none() && self.session_token.is_none()
    }
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether `actor` may GET `path` on storage service `service`.
    async fn can_read(&self, actor: &Actor, service: &str, path: &str) -> bool;
}

/// Path-prefix rules per storage service.
///
/// A rule of `"*"` grants the whole service. Services without rules are
/// denied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticPermissionChecker {
    #[serde(default)]
    pub rules: HashMap<String, Vec<String>>,
    /// Deny every anonymous caller regardless of rules.
    #[serde(default)]
    pub require_authenticated: bool,
}

impl StaticPermissionChecker {
    pub fn allow(mut self, service: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.rules
            .entry(service.into())
            .or_default()
            .push(prefix.into());
        self
    }

    pub fn require_authenticated(mut self) -> Self {
        self.require_authenticated = true;
        self
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissionChecker {
    async fn can_read(&self, actor: &Actor, service: &str, path: &str) -> bool {
        if self.require_authenticated && actor.is_anonymous() {
            return false;
        }
        if path.split('/').any(|segment| segment == "..") {
            return false;
        }

        let path = path.trim_start_matches('/');
        self.rules.get(service).is_some_and(|prefixes| {
            prefixes
                .iter()
                .any(|prefix| prefix == "*" || path.starts_with(prefix.trim_start_matches('/')))
        })
    }
}
