//! URL validation for server-side fetches of user-supplied URLs
//!
//! Attachment imports download whatever URL the caller names, so the target
//! is checked before any request is made: only HTTP(S) is accepted, and
//! literal private, loopback, link-local and metadata addresses are refused
//! unless the caller explicitly allows internal targets.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("URL scheme must be HTTP or HTTPS")]
    InvalidScheme,

    #[error("Private IP addresses are not allowed")]
    PrivateIp,

    #[error("Loopback addresses are not allowed")]
    LoopbackIp,

    #[error("Link-local addresses are not allowed")]
    LinkLocalIp,

    #[error("Cloud metadata service access is not allowed")]
    CloudMetadata,

    #[error("Multicast, broadcast or unspecified addresses are not allowed")]
    NonUnicastIp,
}

/// Parse `url` and check it is an acceptable fetch target.
///
/// ```
/// use dfmail_core::url_validation::validate_fetch_url;
///
/// assert!(validate_fetch_url("https://example.com/a.pdf", false).is_ok());
/// assert!(validate_fetch_url("file:///etc/passwd", true).is_err());
/// assert!(validate_fetch_url("http://127.0.0.1/a.pdf", false).is_err());
/// assert!(validate_fetch_url("http://127.0.0.1/a.pdf", true).is_ok());
/// ```
pub fn validate_fetch_url(url: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlValidationError::InvalidScheme);
    }

    let host = parsed
        .host()
        .ok_or_else(|| UrlValidationError::InvalidFormat("URL must have a host".to_string()))?;

    if allow_private {
        return Ok(parsed);
    }

    match host {
        Host::Ipv4(ip) => validate_ipv4(&ip)?,
        Host::Ipv6(ip) => validate_ipv6(&ip)?,
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(UrlValidationError::LoopbackIp);
            }
            if domain == "metadata.google.internal" {
                return Err(UrlValidationError::CloudMetadata);
            }
        }
    }

    Ok(parsed)
}

pub fn validate_ipv4(ip: &Ipv4Addr) -> Result<(), UrlValidationError> {
    if *ip == Ipv4Addr::new(169, 254, 169, 254) || *ip == Ipv4Addr::new(100, 100, 100, 200) {
        return Err(UrlValidationError::CloudMetadata);
    }
    if ip.is_loopback() {
        return Err(UrlValidationError::LoopbackIp);
    }
    if ip.is_link_local() {
        return Err(UrlValidationError::LinkLocalIp);
    }
    // 100.64.0.0/10 carrier-grade NAT is treated as private.
    let cgnat = ip.octets()[0] == 100 && (ip.octets()[1] & 0b1100_0000) == 64;
    if ip.is_private() || cgnat {
        return Err(UrlValidationError::PrivateIp);
    }
    if ip.is_multicast() || ip.is_broadcast() || ip.is_unspecified() {
        return Err(UrlValidationError::NonUnicastIp);
    }
    Ok(())
}

pub fn validate_ipv6(ip: &Ipv6Addr) -> Result<(), UrlValidationError> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return validate_ipv4(&mapped);
    }
    if ip.is_loopback() {
        return Err(UrlValidationError::LoopbackIp);
    }
    if ip.is_multicast() || ip.is_unspecified() {
        return Err(UrlValidationError::NonUnicastIp);
    }
    let first = ip.segments()[0];
    if (first & 0xffc0) == 0xfe80 {
        return Err(UrlValidationError::LinkLocalIp);
    }
    if *ip == Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254) {
        return Err(UrlValidationError::CloudMetadata);
    }
    if (first & 0xfe00) == 0xfc00 {
        return Err(UrlValidationError::PrivateIp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_pass() {
        assert!(validate_fetch_url("https://example.com/files/a.pdf", false).is_ok());
        assert!(validate_fetch_url("http://8.8.8.8/a.txt", false).is_ok());
    }

    #[test]
    fn test_scheme_is_checked_even_when_private_allowed() {
        assert_eq!(
            validate_fetch_url("ftp://example.com/a.txt", true).unwrap_err(),
            UrlValidationError::InvalidScheme
        );
    }

    #[test]
    fn test_blocked_ipv4_targets() {
        let cases = [
            ("http://10.0.0.5/", UrlValidationError::PrivateIp),
            ("http://192.168.1.1/", UrlValidationError::PrivateIp),
            ("http://100.64.1.1/", UrlValidationError::PrivateIp),
            ("http://127.0.0.1:8080/", UrlValidationError::LoopbackIp),
            ("http://169.254.169.254/latest", UrlValidationError::CloudMetadata),
            ("http://169.254.10.1/", UrlValidationError::LinkLocalIp),
            ("http://0.0.0.0/", UrlValidationError::NonUnicastIp),
        ];
        for (url, expected) in cases {
            assert_eq!(validate_fetch_url(url, false).unwrap_err(), expected, "{}", url);
        }
    }

    #[test]
    fn test_blocked_ipv6_targets() {
        assert_eq!(
            validate_fetch_url("http://[::1]/", false).unwrap_err(),
            UrlValidationError::LoopbackIp
        );
        assert_eq!(
            validate_fetch_url("http://[fe80::1]/", false).unwrap_err(),
            UrlValidationError::LinkLocalIp
        );
        assert_eq!(
            validate_fetch_url("http://[fd12::1]/", false).unwrap_err(),
            UrlValidationError::PrivateIp
        );
        assert_eq!(
            validate_fetch_url("http://[::ffff:10.0.0.1]/", false).unwrap_err(),
            UrlValidationError::PrivateIp
        );
    }

    #[test]
    fn test_localhost_names() {
        assert_eq!(
            validate_fetch_url("http://localhost:3000/a", false).unwrap_err(),
            UrlValidationError::LoopbackIp
        );
        assert!(validate_fetch_url("http://localhost:3000/a", true).is_ok());
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        assert!(matches!(
            validate_fetch_url("not a url", false),
            Err(UrlValidationError::InvalidFormat(_))
        ));
    }
}
