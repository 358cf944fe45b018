/// Credential Codec
///
/// Signs and verifies compact JWTs (HS256). Each token class has its own
/// signing key and lifetime; every token is bound to the configured issuer
/// and audience. Verification fails closed on any mismatch.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::fmt;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RegisteredClaims, SubjectClaims, TokenClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Token classes, each with an independent key and expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    PasswordReset,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
            TokenKind::PasswordReset => write!(f, "password_reset"),
        }
    }
}

/// Why a token failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    Expired,
    /// Bad signature, wrong issuer/audience, or unparseable
    Invalid,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Expired => write!(f, "token expired"),
            CodecError::Invalid => write!(f, "token invalid"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for AuthError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Expired => AuthError::TokenExpired,
            CodecError::Invalid => AuthError::TokenInvalid,
        }
    }
}

impl From<CodecError> for AppError {
    fn from(err: CodecError) -> Self {
        AppError::Auth(err.into())
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: i64,
}

impl KeyPair {
    fn new(secret: &str, expiry: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }
}

/// Stateless signer/verifier built once from configuration
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    password_reset: KeyPair,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            access: KeyPair::new(&config.access_secret, config.access_token_expiry),
            refresh: KeyPair::new(&config.refresh_secret, config.refresh_token_expiry),
            password_reset: KeyPair::new(
                &config.password_reset_secret,
                config.password_reset_expiry,
            ),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::PasswordReset => &self.password_reset,
        }
    }

    /// Lifetime in seconds of tokens of this kind
    pub fn expiry(&self, kind: TokenKind) -> i64 {
        self.keys(kind).expiry
    }

    fn registered(&self, kind: TokenKind, user_id: Uuid) -> RegisteredClaims {
        RegisteredClaims::new(user_id, self.expiry(kind), &self.issuer, &self.audience)
    }

    /// Sign arbitrary claims with the key of `kind`
    pub fn sign<C: TokenClaims>(&self, kind: TokenKind, claims: &C) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys(kind).encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, expiry, issuer and audience
    pub fn verify<C: TokenClaims>(&self, kind: TokenKind, token: &str) -> Result<C, CodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        decode::<C>(token, &self.keys(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(kind = %kind, error = %e, "Token verification failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => CodecError::Expired,
                    _ => CodecError::Invalid,
                }
            })
    }

    pub fn sign_access(&self, user_id: Uuid, email: &str) -> Result<String, AppError> {
        let claims = AccessClaims {
            registered: self.registered(TokenKind::Access, user_id),
            email: email.to_string(),
        };
        self.sign(TokenKind::Access, &claims)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = SubjectClaims {
            registered: self.registered(TokenKind::Refresh, user_id),
        };
        self.sign(TokenKind::Refresh, &claims)
    }

    pub fn sign_password_reset(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = SubjectClaims {
            registered: self.registered(TokenKind::PasswordReset, user_id),
        };
        self.sign(TokenKind::PasswordReset, &claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, CodecError> {
        self.verify(TokenKind::Access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<SubjectClaims, CodecError> {
        self.verify(TokenKind::Refresh, token)
    }

    pub fn verify_password_reset(&self, token: &str) -> Result<SubjectClaims, CodecError> {
        self.verify(TokenKind::PasswordReset, token)
    }
}
