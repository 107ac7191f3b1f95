//! Caller identity resolution
//!
//! The identity is the key fragment all per-client state hangs off. It is
//! resolved from request headers in this order:
//!
//! 1. `X-Real-IP`, set by a trusted reverse proxy
//! 2. the first entry of `X-Forwarded-For`
//! 3. `CF-Connecting-IP`, set by the edge network
//! 4. [`UNKNOWN_IDENTITY`]
//!
//! Every caller that resolves to the sentinel shares one rate-limit bucket.

use std::collections::{BTreeMap, HashMap};

/// Identity used when no header yields a usable value
pub const UNKNOWN_IDENTITY: &str = "unknown";

const REAL_IP_HEADER: &str = "X-Real-IP";
const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
const EDGE_CLIENT_IP_HEADER: &str = "CF-Connecting-IP";

const MAX_IDENTITY_LEN: usize = 255;
const MAX_ENDPOINT_LEN: usize = 128;

/// Read-only view of request headers
///
/// Implemented for `http::HeaderMap` (feature `http`), string maps, and
/// slices of name/value pairs.
pub trait HeaderAccessor {
    /// Value of the named header, if present and valid UTF-8
    fn get(&self, name: &str) -> Option<&str>;
}

/// Resolve the caller identity from request headers
///
/// Never fails: a missing or malformed candidate falls through to the next
/// source, and finally to [`UNKNOWN_IDENTITY`].
///
/// # Example
///
/// ```
/// use turnstile::extract_identity;
///
/// let headers = [("X-Forwarded-For", "1.2.3.4, 5.6.7.8")];
/// assert_eq!(extract_identity(&headers[..]), "1.2.3.4");
/// ```
pub fn extract_identity<H: HeaderAccessor + ?Sized>(headers: &H) -> String {
    if let Some(real_ip) = lookup(headers, REAL_IP_HEADER).and_then(valid_identity) {
        return real_ip.to_string();
    }

    if let Some(client) = lookup(headers, FORWARDED_FOR_HEADER)
        .and_then(|chain| chain.split(',').next())
        .and_then(valid_identity)
    {
        return client.to_string();
    }

    if let Some(edge_ip) = lookup(headers, EDGE_CLIENT_IP_HEADER).and_then(valid_identity) {
        return edge_ip.to_string();
    }

    UNKNOWN_IDENTITY.to_string()
}

/// Normalize an identity supplied directly by a caller
pub fn normalize_identity(identity: &str) -> &str {
    valid_identity(identity).unwrap_or(UNKNOWN_IDENTITY)
}

/// Normalize an endpoint name
///
/// Endpoint names end up inside hash field names, so they are held to the
/// same rules as identities with a shorter length cap.
pub fn normalize_endpoint(endpoint: &str) -> &str {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_ENDPOINT_LEN || !is_printable(trimmed) {
        UNKNOWN_IDENTITY
    } else {
        trimmed
    }
}

fn lookup<'a, H: HeaderAccessor + ?Sized>(headers: &'a H, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| headers.get(&name.to_ascii_lowercase()))
}

fn valid_identity(candidate: &str) -> Option<&str> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_IDENTITY_LEN || !is_printable(trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

fn is_printable(value: &str) -> bool {
    !value.chars().any(|c| c.is_whitespace() || c.is_control())
}

impl HeaderAccessor for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        HashMap::get(self, name).map(String::as_str)
    }
}

impl HeaderAccessor for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        BTreeMap::get(self, name).map(String::as_str)
    }
}

impl HeaderAccessor for [(&str, &str)] {
    fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

#[cfg(feature = "http")]
impl HeaderAccessor for http::HeaderMap {
    fn get(&self, name: &str) -> Option<&str> {
        http::HeaderMap::get(self, name).and_then(|value| value.to_str().ok())
    }
}
