//! Caller identification for rate limiting.
//!
//! Authenticated callers are keyed by user id. Anonymous callers are keyed
//! by a short fingerprint of their client IP and a few request headers, so
//! that callers behind the same proxy but with different clients are
//! distinguished.

use sha2::{Digest, Sha256};

/// User id carried by service-to-service tokens.
pub const SYSTEM_USER_ID: &str = "system";

const UNKNOWN: &str = "unknown";

/// Headers consulted for the client IP after `X-Forwarded-For`, in order.
const IP_HEADERS: [&str; 4] = ["x-real-ip", "x-forwarded", "forwarded-for", "forwarded"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind {
    Authenticated,
    Anonymous,
}

impl CallerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerKind::Authenticated => "authenticated",
            CallerKind::Anonymous => "anonymous",
        }
    }
}

/// Request attributes that make up an anonymous fingerprint.
#[derive(Debug, Clone, Default)]
pub struct ClientHints {
    pub ip: String,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
}

/// A resolved caller: the limiter key plus its tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identifier: String,
    pub kind: CallerKind,
}

impl Caller {
    pub fn is_authenticated(&self) -> bool {
        self.kind == CallerKind::Authenticated
    }

    /// First 16 characters followed by `...`, for display.
    pub fn masked(&self) -> String {
        let prefix: String = self.identifier.chars().take(16).collect();
        format!("{}...", prefix)
    }
}

/// Real (non-system) user ids count as authenticated.
pub fn is_real_user(user_id: Option<&str>) -> bool {
    matches!(user_id, Some(id) if !id.is_empty() && id != SYSTEM_USER_ID)
}

pub fn identify(user_id: Option<&str>, hints: &ClientHints) -> Caller {
    match user_id {
        Some(id) if is_real_user(Some(id)) => Caller {
            identifier: format!("auth:{}", id),
            kind: CallerKind::Authenticated,
        },
        _ => Caller {
            identifier: format!("anon:{}", anonymous_fingerprint(hints)),
            kind: CallerKind::Anonymous,
        },
    }
}

/// First 16 hex chars of `sha256("|ip|ua|lang|enc")`.
pub fn anonymous_fingerprint(hints: &ClientHints) -> String {
    let parts = [
        Some(hints.ip.as_str()),
        hints.user_agent.as_deref(),
        hints.accept_language.as_deref(),
        hints.accept_encoding.as_deref(),
    ];
    let material = parts.iter().fold(String::new(), |mut acc, part| {
        acc.push('|');
        acc.push_str(part.filter(|p| !p.is_empty()).unwrap_or(UNKNOWN));
        acc
    });
    let digest = hex::encode(Sha256::digest(material.as_bytes()));
    digest[..16].to_string()
}

/// Resolve the client IP from proxy headers, falling back to the socket
/// address.
///
/// `header` looks up a lowercase header name. `X-Forwarded-For` wins and
/// contributes its first hop; the remaining proxy headers are tried in
/// order, skipping empty and `unknown` values.
pub fn client_ip<'a>(header: impl Fn(&str) -> Option<&'a str>, remote: Option<&str>) -> String {
    let usable = |v: &str| !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN);

    if let Some(forwarded_for) = header("x-forwarded-for") {
        let first = forwarded_for.split(',').next().unwrap_or("").trim();
        if usable(first) {
            return first.to_string();
        }
    }
    for name in IP_HEADERS {
        if let Some(value) = header(name) {
            let value = value.trim();
            if usable(value) {
                return value.to_string();
            }
        }
    }
    remote.unwrap_or(UNKNOWN).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn hints(ip: &str, ua: Option<&str>) -> ClientHints {
        ClientHints {
            ip: ip.to_string(),
            user_agent: ua.map(String::from),
            accept_language: Some("en-US".into()),
            accept_encoding: Some("gzip".into()),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = anonymous_fingerprint(&hints("10.0.0.1", Some("curl/8")));
        let b = anonymous_fingerprint(&hints("10.0.0.1", Some("curl/8")));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, anonymous_fingerprint(&hints("10.0.0.2", Some("curl/8"))));
    }

    #[test]
    fn test_fingerprint_material_layout() {
        let h = hints("1.2.3.4", None);
        let expected = hex::encode(Sha256::digest(b"|1.2.3.4|unknown|en-US|gzip"));
        assert_eq!(anonymous_fingerprint(&h), expected[..16]);
    }

    #[test]
    fn test_identify_tiers() {
        let h = hints("1.2.3.4", None);
        let user = identify(Some("42"), &h);
        assert_eq!(user.identifier, "auth:42");
        assert!(user.is_authenticated());

        let system = identify(Some(SYSTEM_USER_ID), &h);
        assert_eq!(system.kind, CallerKind::Anonymous);
        assert!(system.identifier.starts_with("anon:"));

        assert_eq!(identify(Some(""), &h).kind, CallerKind::Anonymous);
        assert_eq!(identify(None, &h).masked().len(), 19);
    }

    #[test]
    fn test_client_ip_precedence() {
        let headers: HashMap<&str, &str> = [
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]
        .into_iter()
        .collect();
        let ip = client_ip(|n| headers.get(n).copied(), Some("127.0.0.1"));
        assert_eq!(ip, "203.0.113.7");

        let headers: HashMap<&str, &str> = [
            ("x-forwarded-for", "unknown"),
            ("x-real-ip", "198.51.100.2"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            client_ip(|n| headers.get(n).copied(), Some("127.0.0.1")),
            "198.51.100.2"
        );

        assert_eq!(client_ip(|_| None, Some("127.0.0.1")), "127.0.0.1");
        assert_eq!(client_ip(|_| None, None), "unknown");
    }
}
