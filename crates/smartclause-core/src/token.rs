//! HS256 JSON Web Tokens.
//!
//! Tokens are `base64url(header).base64url(claims).base64url(signature)`
//! without padding, signed with HMAC-SHA256 over the first two segments.
//! Only `alg = HS256` is accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::identity::SYSTEM_USER_ID;
use crate::models::{Role, User};

type HmacSha256 = Hmac<Sha256>;

pub const SYSTEM_EMAIL: &str = "system@smartclause.internal";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Token claims. Field names follow the camelCase wire format
/// (`userId`, `isEmailVerified`, `serviceAccount`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Username, or `system` for service tokens.
    pub sub: String,
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<bool>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_system(&self) -> bool {
        self.user_id == SYSTEM_USER_ID && self.service_account == Some(true)
    }
}

/// Issues and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Token for a registered account.
    pub fn issue_for(&self, user: &User, now: DateTime<Utc>) -> String {
        let iat = now.timestamp();
        self.sign(&Claims {
            sub: user.username.clone(),
            user_id: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            is_email_verified: user.is_email_verified,
            service_account: None,
            iat,
            exp: iat + self.ttl_secs,
        })
    }

    /// Service-to-service token used when no caller token is available.
    pub fn issue_system(&self, now: DateTime<Utc>) -> String {
        let iat = now.timestamp();
        self.sign(&Claims {
            sub: SYSTEM_USER_ID.to_string(),
            user_id: SYSTEM_USER_ID.to_string(),
            email: SYSTEM_EMAIL.to_string(),
            role: Role::System.as_str().to_string(),
            is_email_verified: true,
            service_account: Some(true),
            iat,
            exp: iat + self.ttl_secs,
        })
    }

    pub fn sign(&self, claims: &Claims) -> String {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        // Serializing plain structs of strings and integers cannot fail.
        let header_json = serde_json::to_vec(&header).unwrap_or_default();
        let claims_json = serde_json::to_vec(claims).unwrap_or_default();
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature =
            URL_SAFE_NO_PAD.encode(self.mac(signing_input.as_bytes()).finalize().into_bytes());
        format!("{}.{}", signing_input, signature)
    }

    /// Check structure, algorithm, signature and expiry.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        self.mac(signing_input.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "lawyer".into(),
            email: "lawyer@example.com".into(),
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            role: Role::User,
            is_active: true,
            is_email_verified: false,
            email_verification_token: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let signer = TokenSigner::new(SECRET, 3600);
        let u = user();
        let now = Utc::now();
        let token = signer.issue_for(&u, now);
        let claims = signer.verify(&token, now).unwrap();
        assert_eq!(claims.sub, "lawyer");
        assert_eq!(claims.user_id, u.id.to_string());
        assert_eq!(claims.role, "USER");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_system());
    }

    #[test]
    fn test_claims_wire_names() {
        let signer = TokenSigner::new(SECRET, 60);
        let token = signer.issue_system(Utc::now());
        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(json["userId"], "system");
        assert_eq!(json["serviceAccount"], true);
        assert_eq!(json["email"], SYSTEM_EMAIL);
        assert_eq!(json["role"], "SYSTEM");
    }

    #[test]
    fn test_system_token() {
        let signer = TokenSigner::new(SECRET, 60);
        let now = Utc::now();
        let claims = signer.verify(&signer.issue_system(now), now).unwrap();
        assert!(claims.is_system());
    }

    #[test]
    fn test_rejects_tampering_and_wrong_secret() {
        let signer = TokenSigner::new(SECRET, 3600);
        let now = Utc::now();
        let token = signer.issue_for(&user(), now);

        let other = TokenSigner::new("another-secret-that-is-also-long-enough", 3600);
        assert_eq!(other.verify(&token, now), Err(TokenError::BadSignature));

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin","userId":"1","email":"x","role":"ADMIN","iat":0,"exp":99999999999}"#);
        parts[1] = &forged_claims;
        assert_eq!(signer.verify(&parts.join("."), now), Err(TokenError::BadSignature));

        assert_eq!(signer.verify("abc", now), Err(TokenError::Malformed));
        assert_eq!(signer.verify("a.b.c.d", now), Err(TokenError::Malformed));
    }

    #[test]
    fn test_expired() {
        let signer = TokenSigner::new(SECRET, 60);
        let issued = Utc::now();
        let token = signer.issue_for(&user(), issued);
        assert!(signer.verify(&token, issued + Duration::seconds(59)).is_ok());
        assert_eq!(
            signer.verify(&token, issued + Duration::seconds(60)),
            Err(TokenError::Expired)
        );
    }
}
