//! Recipient and sender address sanitizing
//!
//! Address fields arrive in several shapes: a bare address, a `,`/`;`
//! separated list (entries may be `Name <addr>`), a list of strings or
//! `{name, email}` objects, or a single such object. All of them normalize to
//! `lettre` mailboxes, which every transport consumes.

use lettre::message::Mailbox;
use lettre::Address;
use serde_json::Value;

use crate::errors::EmailError;

const EMPTY_ADDRESS: &str = "Invalid email - empty string.";

/// Sanitize an optional address field; `null` and blank input give an empty list.
pub fn sanitize(value: &Value) -> Result<Vec<Mailbox>, EmailError> {
    let mut mailboxes = Vec::new();
    collect(value, &mut mailboxes)?;
    Ok(mailboxes)
}

/// Sanitize a field that must name at least one address.
pub fn sanitize_required(value: &Value) -> Result<Vec<Mailbox>, EmailError> {
    let mailboxes = sanitize(value)?;
    if mailboxes.is_empty() {
        return Err(EmailError::Validation(EMPTY_ADDRESS.to_string()));
    }
    Ok(mailboxes)
}

/// Sanitize a field that names at most one address, such as the sender or
/// reply-to.
///
/// `fallback_name` is used when the address carries no display name of its
/// own. More than one address is a validation error.
pub fn sanitize_single(
    value: &Value,
    fallback_name: Option<&str>,
) -> Result<Option<Mailbox>, EmailError> {
    let mut mailboxes = sanitize(value)?;
    if mailboxes.len() > 1 {
        return Err(EmailError::Validation(format!(
            "Only one address is allowed - '{}'.",
            plain_addresses(&mailboxes).join(", ")
        )));
    }

    Ok(mailboxes.pop().map(|found| match found.name {
        Some(_) => found,
        None => {
            let name = fallback_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            Mailbox::new(name, found.email)
        }
    }))
}

/// Build one mailbox from a separate address and display name.
pub fn mailbox(email: &str, name: Option<&str>) -> Result<Mailbox, EmailError> {
    let address = parse_address(email)?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}

/// Bare addresses of a mailbox list, for logs and provider envelopes.
pub fn plain_addresses(mailboxes: &[Mailbox]) -> Vec<String> {
    mailboxes.iter().map(|m| m.email.to_string()).collect()
}

fn collect(value: &Value, out: &mut Vec<Mailbox>) -> Result<(), EmailError> {
    match value {
        Value::Null => Ok(()),
        Value::String(list) => {
            for entry in split_list(list) {
                out.push(parse_entry(&entry)?);
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(_) | Value::Object(_) => collect(item, out)?,
                    other => return Err(invalid(&other.to_string())),
                }
            }
            Ok(())
        }
        Value::Object(pair) => {
            let email = pair
                .get("email")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| EmailError::Validation(EMPTY_ADDRESS.to_string()))?;
            let name = pair.get("name").and_then(Value::as_str);
            out.push(mailbox(email, name)?);
            Ok(())
        }
        other => Err(invalid(&other.to_string())),
    }
}

/// Split on `,` and `;` outside quotes and angle brackets, dropping blanks.
fn split_list(list: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut bracketed = false;

    for c in list.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '<' if !quoted => {
                bracketed = true;
                current.push(c);
            }
            '>' if !quoted => {
                bracketed = false;
                current.push(c);
            }
            ',' | ';' if !quoted && !bracketed => {
                entries.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    entries.push(current);

    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// `addr` or `Name <addr>`.
fn parse_entry(entry: &str) -> Result<Mailbox, EmailError> {
    match (entry.rfind('<'), entry.ends_with('>')) {
        (Some(open), true) => {
            let email = &entry[open + 1..entry.len() - 1];
            let name = entry[..open].trim().trim_matches('"').trim();
            mailbox(email, Some(name))
        }
        _ => mailbox(entry, None),
    }
}

fn parse_address(email: &str) -> Result<Address, EmailError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(EmailError::Validation(EMPTY_ADDRESS.to_string()));
    }

    let address: Address = email.parse().map_err(|_| invalid(email))?;
    if !is_domain_like(address.domain()) {
        return Err(invalid(email));
    }
    Ok(address)
}

/// At least two dot-separated labels, none empty, ending in an alphabetic TLD.
fn is_domain_like(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return false;
    }
    labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}

fn invalid(email: &str) -> EmailError {
    EmailError::Validation(format!("Invalid email - '{}'.", email))
}
