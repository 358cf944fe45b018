/// JWT Claims structures
///
/// Access tokens carry the subject and email; refresh and password-reset
/// tokens carry the subject only. All of them carry issuer, audience and a
/// random `jti` so two tokens minted in the same second never collide.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Registered claims shared by every token class (RFC 7519)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegisteredClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    pub aud: String,
    /// Token ID
    pub jti: String,
}

impl RegisteredClaims {
    pub fn new(user_id: Uuid, expiry_seconds: i64, issuer: &str, audience: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer.to_string(),
            aud: audience.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract user ID from the subject
    ///
    /// A verified token with a non-UUID subject was not minted by us.
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::TokenInvalid)
    }
}

/// Claims of an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
    pub email: String,
}

/// Claims of a refresh or password-reset token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SubjectClaims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

/// Anything the codec can sign and verify
pub trait TokenClaims: Serialize + for<'de> Deserialize<'de> {
    fn registered(&self) -> &RegisteredClaims;

    fn user_id(&self) -> Result<Uuid, AuthError> {
        self.registered().user_id()
    }
}

impl TokenClaims for AccessClaims {
    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }
}

impl TokenClaims for SubjectClaims {
    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }
}
