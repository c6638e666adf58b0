use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type KeyId = String;
pub type ProfileId = String;

/// Decoded payload of a verified token.
pub type Claims = serde_json::Map<String, Value>;

/// Outcome of one verification call. Exactly one variant per call.
pub type VerificationResult = Result<VerifiedToken, FailureReason>;

pub const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Minimal JWK structure for RSA/EC/OKP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC / OKP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Public key material as published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "key", rename_all = "snake_case")]
pub enum PublicKey {
    /// PEM-encoded X.509 certificate or SubjectPublicKeyInfo.
    Pem(String),
    Jwk(Jwk),
}

/// Which issuer a token must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerSelector {
    /// Use this issuer string as-is.
    Literal(String),
    /// Resolve the issuer from a named configuration profile.
    Profile(ProfileId),
}

impl IssuerSelector {
    /// Issuer used by Firebase Authentication for the given project.
    pub fn firebase_project(project_id: &str) -> Self {
        Self::Literal(firebase_issuer(project_id))
    }
}

pub fn firebase_issuer(project_id: &str) -> String {
    format!("{FIREBASE_ISSUER_PREFIX}{project_id}")
}

/// Why a token was rejected.
///
/// The set is closed: callers branch on it, so adding a variant is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("token is not a well-formed signed token")]
    InvalidToken,
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("no usable public key for the token's key id")]
    UnknownOrInvalidKey,
    #[error("token signature does not verify")]
    InvalidSignature,
    #[error("token issuer does not match the expected issuer")]
    IssuerMismatch,
    #[error("token claims are missing or malformed")]
    MalformedClaims,
    #[error("token has expired")]
    Expired,
}

impl FailureReason {
    pub const ALL: [FailureReason; 7] = [
        FailureReason::InvalidToken,
        FailureReason::MissingKeyId,
        FailureReason::UnknownOrInvalidKey,
        FailureReason::InvalidSignature,
        FailureReason::IssuerMismatch,
        FailureReason::MalformedClaims,
        FailureReason::Expired,
    ];

    /// Stable machine-readable code.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::InvalidToken => "invalid_token",
            FailureReason::MissingKeyId => "missing_key_id",
            FailureReason::UnknownOrInvalidKey => "unknown_or_invalid_key",
            FailureReason::InvalidSignature => "invalid_signature",
            FailureReason::IssuerMismatch => "issuer_mismatch",
            FailureReason::MalformedClaims => "malformed_claims",
            FailureReason::Expired => "expired",
        }
    }
}

/// A token that passed every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedToken {
    pub subject: String,
    pub claims: Claims,
}

impl VerifiedToken {
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    pub fn iss(&self) -> Option<&str> {
        self.claim("iss").and_then(Value::as_str)
    }

    pub fn exp(&self) -> Option<i64> {
        self.claim("exp").and_then(Value::as_i64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FiregateError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("key set error: {0}")]
    KeySet(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Read side of the public key table, keyed by `kid`.
///
/// A miss means "key unknown"; callers do not distinguish it from a key that never existed.
pub trait KeyStore: Send + Sync {
    fn lookup(&self, kid: &str) -> Option<PublicKey>;
}

pub trait IssuerResolver: Send + Sync {
    fn resolve_issuer(&self, profile: &str) -> Result<String, FiregateError>;
}

impl KeyStore for HashMap<KeyId, PublicKey> {
    fn lookup(&self, kid: &str) -> Option<PublicKey> {
        self.get(kid).cloned()
    }
}

impl KeyStore for BTreeMap<KeyId, PublicKey> {
    fn lookup(&self, kid: &str) -> Option<PublicKey> {
        self.get(kid).cloned()
    }
}

impl<T: KeyStore + ?Sized> KeyStore for Arc<T> {
    fn lookup(&self, kid: &str) -> Option<PublicKey> {
        (**self).lookup(kid)
    }
}

impl IssuerResolver for BTreeMap<ProfileId, String> {
    fn resolve_issuer(&self, profile: &str) -> Result<String, FiregateError> {
        self.get(profile)
            .cloned()
            .ok_or_else(|| FiregateError::NotFound(format!("profile {profile} not found")))
    }
}
