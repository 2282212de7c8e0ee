//! Session identity derived from the bearer token.
//!
//! The token is a compact three-segment signed token. Only the middle
//! segment is read client-side (base64url, JSON, `sub` claim holding a
//! string-encoded integer user id); the signature is the server's concern
//! and the token is otherwise treated as opaque.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use thiserror::Error;

/// Authenticated session; exactly one per connection.
///
/// Created when the server accepts the auth handshake, dropped on
/// rejection or connection close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The token the session was established with.
    pub token: String,
    /// User id from the token's `sub` claim.
    pub user_id: i64,
}

/// Errors produced while reading the token's claims segment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The token does not have three dot-separated segments.
    #[error("token does not have three segments")]
    MalformedToken,
    /// The claims segment is not valid base64url.
    #[error("claims segment is not valid base64url: {0}")]
    InvalidEncoding(String),
    /// The claims segment is not a JSON object with a `sub` claim.
    #[error("claims segment is not decodable JSON: {0}")]
    InvalidClaims(String),
    /// The `sub` claim is not a string-encoded integer.
    #[error("subject claim '{0}' is not an integer user id")]
    InvalidSubject(String),
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
}

impl Session {
    /// Derive a session from a token by decoding its `sub` claim.
    pub fn from_token(token: impl Into<String>) -> Result<Self, SessionError> {
        let token = token.into();
        let user_id = decode_user_id(&token)?;
        Ok(Self { token, user_id })
    }
}

/// Decode the user id from the token's middle segment.
pub fn decode_user_id(token: &str) -> Result<i64, SessionError> {
    let mut segments = token.split('.');
    let claims_segment = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(claims), Some(_)) if segments.next().is_none() => claims,
        _ => return Err(SessionError::MalformedToken),
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(claims_segment)
        .map_err(|err| SessionError::InvalidEncoding(err.to_string()))?;
    let claims: TokenClaims = serde_json::from_slice(&decoded)
        .map_err(|err| SessionError::InvalidClaims(err.to_string()))?;

    claims
        .sub
        .parse::<i64>()
        .map_err(|_| SessionError::InvalidSubject(claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_claims(claims_json: &str) -> String {
        let claims = URL_SAFE_NO_PAD.encode(claims_json);
        format!("header.{claims}.signature")
    }

    #[test]
    fn decodes_integer_subject_from_claims() {
        let token = token_with_claims(r#"{"sub":"42","exp":1999999999}"#);
        let session = Session::from_token(&token).expect("session should decode");
        assert_eq!(session.user_id, 42);
        assert_eq!(session.token, token);
    }

    #[test]
    fn rejects_token_without_three_segments() {
        assert_eq!(
            decode_user_id("only.two"),
            Err(SessionError::MalformedToken)
        );
        assert_eq!(
            decode_user_id("a.b.c.d"),
            Err(SessionError::MalformedToken)
        );
        assert_eq!(decode_user_id(""), Err(SessionError::MalformedToken));
    }

    #[test]
    fn rejects_non_base64_claims_segment() {
        let err = decode_user_id("header.!!!.signature").expect_err("bad base64 must fail");
        assert!(matches!(err, SessionError::InvalidEncoding(_)));
    }

    #[test]
    fn rejects_claims_without_integer_subject() {
        let token = token_with_claims(r#"{"sub":"alice"}"#);
        assert_eq!(
            decode_user_id(&token),
            Err(SessionError::InvalidSubject("alice".into()))
        );

        let token = token_with_claims(r#"{"exp":1}"#);
        let err = decode_user_id(&token).expect_err("missing sub must fail");
        assert!(matches!(err, SessionError::InvalidClaims(_)));
    }
}
