//! Identity resolution and JWT verification

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::util::time::unix_millis;

type HmacSha256 = Hmac<Sha256>;

/// Longest accepted display name, in characters
const MAX_NAME_CHARS: usize = 32;

/// JWT claims carried by a connection token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (stable identity)
    pub sub: Uuid,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expiration time (Unix timestamp). Tokens without one never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
}

/// Resolved identity behind a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
}

impl Identity {
    fn from_claims(claims: Claims) -> Self {
        let display_name = claims
            .name
            .map(|n| n.trim().chars().take(MAX_NAME_CHARS).collect::<String>())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name(claims.sub));
        Self {
            user_id: claims.sub,
            display_name,
        }
    }
}

/// Fallback display name for identities without a `name` claim
pub fn default_name(user_id: Uuid) -> String {
    format!("Player_{}", &user_id.simple().to_string()[..8])
}

/// Verify an HS256 token and resolve the identity it names
pub fn verify_jwt(token: &str, secret: &str) -> Result<Identity, AuthError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken);
    };

    let header = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let header: Header = serde_json::from_slice(&header).map_err(|_| AuthError::InvalidToken)?;
    if header.alg != "HS256" {
        return Err(AuthError::UnsupportedAlgorithm);
    }

    // Signature check (HMAC-SHA256, constant time)
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    let provided = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided).map_err(|_| AuthError::InvalidToken)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidToken)?;

    if let Some(exp) = claims.exp {
        if exp < unix_millis() / 1000 {
            return Err(AuthError::TokenExpired);
        }
    }

    Ok(Identity::from_claims(claims))
}

/// Sign claims into an HS256 token. Used by local tooling and tests.
pub fn sign_jwt(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::to_vec(claims).map_err(|_| AuthError::InvalidToken)?;
    let message = format!("{}.{}", header, URL_SAFE_NO_PAD.encode(payload));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", message, signature))
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Authentication error types
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims(name: Option<&str>, exp: Option<u64>) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            name: name.map(str::to_string),
            exp,
            iat: 0,
        }
    }

    #[test]
    fn test_signed_token_resolves_identity() {
        let c = claims(Some("  Simon  "), None);
        let token = sign_jwt(&c, SECRET).unwrap();
        let identity = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(identity.user_id, c.sub);
        assert_eq!(identity.display_name, "Simon");
    }

    #[test]
    fn test_missing_name_falls_back() {
        let c = claims(None, None);
        let identity = verify_jwt(&sign_jwt(&c, SECRET).unwrap(), SECRET).unwrap();
        assert!(identity.display_name.starts_with("Player_"));
        assert_eq!(identity.display_name.len(), "Player_".len() + 8);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_jwt(&claims(None, None), SECRET).unwrap();
        assert_eq!(verify_jwt(&token, "other"), Err(AuthError::InvalidToken));
        assert_eq!(verify_jwt("a.b", SECRET), Err(AuthError::InvalidToken));
        assert_eq!(verify_jwt("", SECRET), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_rejected() {
        let token = sign_jwt(&claims(None, Some(1)), SECRET).unwrap();
        assert_eq!(verify_jwt(&token, SECRET), Err(AuthError::TokenExpired));
    }
}
