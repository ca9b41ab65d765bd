use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Claims read from the bearer token payload. The signature is not checked
/// client-side; the backend is the authority.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TokenClaims {
    #[serde(default, alias = "user_id")]
    pub id: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Credentials for talking to the backend, passed explicitly to every client.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    token: Option<String>,
    claims: Option<TokenClaims>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let claims = match decode_claims(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token payload is not readable");
                None
            }
        };
        Self {
            token: Some(token),
            claims,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn claims(&self) -> Option<&TokenClaims> {
        self.claims.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .as_ref()
            .and_then(|c| c.exp)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// True only when the token carries an expiry that has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let payload = token.split('.').nth(1).ok_or(TokenError::Malformed)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(TokenError::Claims)
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is not a three-part JWT")]
    Malformed,

    #[error("Token claims are not valid JSON: {0}")]
    Claims(#[from] serde_json::Error),
}
