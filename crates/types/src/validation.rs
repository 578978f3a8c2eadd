//! Input validation and sanitization for request fields.
//!
//! Used at the service boundary before any store access:
//!
//! - Owner emails get a syntax-only check (no deliverability probing).
//! - Keys and origins must be present and non-empty.
//! - Origin and reporting-context values are stripped of markup before they are
//!   embedded in an alert body.
//!
//! ## Email Character Whitelists
//!
//! - Local part: `[a-zA-Z0-9!#$%&'*+/=?^_`{|}~.-]`, no leading, trailing or doubled dots.
//! - Domain: dot-separated labels of `[a-zA-Z0-9-]{1,63}`, at least two labels, no label
//!   starting or ending with a hyphen.

use std::fmt;

use crate::config::ServiceConfig;

/// Maximum byte length of an email local part (RFC 5321).
const MAX_LOCAL_PART_BYTES: usize = 64;

/// Maximum byte length of a single domain label.
const MAX_DOMAIN_LABEL_BYTES: usize = 63;

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl ValidationError {
    fn new(field: &str, constraint: impl Into<String>) -> Self {
        Self { field: field.to_string(), constraint: constraint.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validates the syntax of an owner email address.
///
/// The address must:
/// - Be non-empty and not exceed `config.max_email_bytes`
/// - Contain exactly one `@`
/// - Have a local part of 1-64 bytes from the local-part whitelist
/// - Have a domain of at least two DNS-style labels
///
/// # Errors
///
/// Returns [`ValidationError`] naming the first violated constraint.
pub fn validate_email(email: &str, config: &ServiceConfig) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::new("email", "must not be empty"));
    }
    if email.len() > config.max_email_bytes {
        return Err(ValidationError::new(
            "email",
            format!(
                "length {} bytes exceeds maximum {} bytes",
                email.len(),
                config.max_email_bytes
            ),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("email", "missing '@' separator"));
    };
    if domain.contains('@') {
        return Err(ValidationError::new("email", "contains more than one '@'"));
    }

    validate_local_part(local)?;
    validate_domain(domain)
}

fn validate_local_part(local: &str) -> Result<(), ValidationError> {
    if local.is_empty() || local.len() > MAX_LOCAL_PART_BYTES {
        return Err(ValidationError::new(
            "email",
            format!("local part must be 1-{MAX_LOCAL_PART_BYTES} bytes"),
        ));
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(ValidationError::new("email", "local part has a misplaced '.'"));
    }
    if let Some(c) = local.chars().find(|&c| !is_local_char(c)) {
        return Err(ValidationError::new(
            "email",
            format!("local part contains invalid character {c:?}"),
        ));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<(), ValidationError> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(ValidationError::new("email", "domain must contain at least two labels"));
    }
    for label in labels {
        if label.is_empty() || label.len() > MAX_DOMAIN_LABEL_BYTES {
            return Err(ValidationError::new(
                "email",
                format!("domain labels must be 1-{MAX_DOMAIN_LABEL_BYTES} bytes"),
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ValidationError::new("email", "domain label starts or ends with '-'"));
        }
        if let Some(c) = label.chars().find(|&c| !(c.is_ascii_alphanumeric() || c == '-')) {
            return Err(ValidationError::new(
                "email",
                format!("domain contains invalid character {c:?}"),
            ));
        }
    }
    Ok(())
}

#[inline]
fn is_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c)
}

/// Returns the value if it is present and non-empty.
///
/// # Errors
///
/// Returns [`ValidationError`] for `field` when the value is absent or empty.
pub fn require_present<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::new(field, "must be present and non-empty")),
    }
}

/// Truncates `input` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_utf8(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

/// Strips markup-like substrings from a client-supplied value.
///
/// Everything from a `<` up to and including the next `>` is removed. A `<`
/// with no closing `>` drops the rest of the input. Stray `>` characters and
/// ASCII control characters are removed as well, so the result never contains
/// angle brackets.
pub fn sanitize_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {},
            c if c.is_ascii_control() => {},
            c => out.push(c),
        }
    }
    out.trim().to_string()
}
