//! Token verification pipeline.

use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use firegate_api::{
    Claims, FailureReason, FiregateError, IssuerResolver, IssuerSelector, KeyStore,
    VerificationResult, VerifiedToken,
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::keys::decoding_key;

/// Options for token verification.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Algorithms a token header may name. Firebase signs with RS256 only.
    pub allowed_algs: Vec<Algorithm>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            allowed_algs: vec![Algorithm::RS256],
        }
    }
}

/// Verifies signed identity tokens against a [`KeyStore`].
///
/// Holds no per-call state; one instance can serve any number of threads.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<dyn KeyStore>,
    issuers: Option<Arc<dyn IssuerResolver>>,
    clock: Arc<dyn Clock>,
    options: VerifyOptions,
}

impl TokenVerifier {
    pub fn new(keys: Arc<dyn KeyStore>) -> Self {
        Self {
            keys,
            issuers: None,
            clock: Arc::new(SystemClock),
            options: VerifyOptions::default(),
        }
    }

    /// Resolver used for [`IssuerSelector::Profile`].
    #[must_use]
    pub fn with_resolver(mut self, issuers: Arc<dyn IssuerResolver>) -> Self {
        self.issuers = Some(issuers);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve the issuer a selector stands for.
    ///
    /// Literals are returned as-is. Meant for startup checks: a profile that does
    /// not resolve here will abort [`TokenVerifier::verify`].
    pub fn resolve_issuer(&self, selector: &IssuerSelector) -> Result<String, FiregateError> {
        let profile = match selector {
            IssuerSelector::Literal(issuer) => return Ok(issuer.clone()),
            IssuerSelector::Profile(profile) => profile,
        };
        let Some(resolver) = &self.issuers else {
            return Err(FiregateError::Validation(format!(
                "no issuer resolver configured for profile {profile}"
            )));
        };
        let issuer = resolver.resolve_issuer(profile)?;
        if issuer.is_empty() {
            return Err(FiregateError::Validation(format!(
                "profile {profile} resolves to an empty issuer"
            )));
        }
        Ok(issuer)
    }

    /// Verify `token` and return its subject and claims.
    ///
    /// Checks run in a fixed order and the first failure decides the result:
    /// header, key, signature, issuer and claims, expiry.
    ///
    /// # Panics
    ///
    /// If `issuer` names a profile that cannot be resolved. That is a deployment
    /// defect, not a property of the token.
    pub fn verify(&self, token: &str, issuer: &IssuerSelector) -> VerificationResult {
        let result = self.run(token, issuer);
        match &result {
            Ok(_) => tracing::trace!("token accepted"),
            Err(reason) => tracing::debug!(reason = reason.as_str(), "token rejected"),
        }
        result
    }

    fn run(&self, token: &str, selector: &IssuerSelector) -> VerificationResult {
        let raw = split_token(token)?;
        let kid = raw.kid.as_deref().ok_or(FailureReason::MissingKeyId)?;

        let issuer = self
            .resolve_issuer(selector)
            .unwrap_or_else(|e| panic!("issuer cannot be resolved: {e}"));

        let key = self
            .keys
            .lookup(kid)
            .ok_or(FailureReason::UnknownOrInvalidKey)?;
        let alg = raw
            .alg
            .filter(|alg| self.options.allowed_algs.contains(alg))
            .ok_or(FailureReason::InvalidSignature)?;
        let key = decoding_key(&key, alg).map_err(|e| {
            tracing::debug!(kid, error = %e, "stored key is unusable");
            FailureReason::UnknownOrInvalidKey
        })?;

        check_signature(&raw, alg, &key)?;
        let (subject, exp, claims) = decode_claims(&raw.payload, &issuer)?;

        let now = self.clock.now_unix();
        if exp <= now {
            return Err(FailureReason::Expired);
        }

        tracing::trace!(kid, "signature verified");
        Ok(VerifiedToken { subject, claims })
    }
}

/// A token split into its segments. Nothing in here is trusted yet.
struct RawToken<'a> {
    kid: Option<String>,
    alg: Option<Algorithm>,
    /// `header.payload`, the signed bytes.
    message: &'a str,
    signature: &'a str,
    payload: Vec<u8>,
}

/// Structural check of all three segments, then the header JSON.
///
/// Only `kid` is required here; an absent or unknown `alg` is left for the
/// signature step to reject.
fn split_token(token: &str) -> Result<RawToken<'_>, FailureReason> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(FailureReason::InvalidToken);
    };

    let decode = |segment: &str| {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| FailureReason::InvalidToken)
    };
    let header = decode(header)?;
    let payload_bytes = decode(payload)?;
    decode(signature)?;

    let Ok(Value::Object(header)) = serde_json::from_slice::<Value>(&header) else {
        return Err(FailureReason::InvalidToken);
    };
    let kid = header.get("kid").and_then(Value::as_str).map(str::to_string);
    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .and_then(|alg| Algorithm::from_str(alg).ok());

    Ok(RawToken {
        kid,
        alg,
        message: &token[..token.len() - signature.len() - 1],
        signature,
        payload: payload_bytes,
    })
}

fn check_signature(
    raw: &RawToken<'_>,
    alg: Algorithm,
    key: &DecodingKey,
) -> Result<(), FailureReason> {
    match jsonwebtoken::crypto::verify(raw.signature, raw.message.as_bytes(), key, alg) {
        Ok(true) => Ok(()),
        Ok(false) => Err(FailureReason::InvalidSignature),
        Err(e) => Err(match e.kind() {
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => FailureReason::UnknownOrInvalidKey,
            _ => FailureReason::InvalidSignature,
        }),
    }
}

/// Read the claims of a payload whose signature is already known to be good.
///
/// A string `iss` that differs from `issuer` is reported before any other claim problem.
fn decode_claims(payload: &[u8], issuer: &str) -> Result<(String, i64, Claims), FailureReason> {
    let Ok(Value::Object(claims)) = serde_json::from_slice::<Value>(payload) else {
        return Err(FailureReason::MalformedClaims);
    };

    match claims.get("iss") {
        Some(Value::String(iss)) if iss == issuer => {}
        Some(Value::String(_)) => return Err(FailureReason::IssuerMismatch),
        _ => return Err(FailureReason::MalformedClaims),
    }
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
        .ok_or(FailureReason::MalformedClaims)?
        .to_string();
    // Expiry is compared by the caller with an exclusive boundary.
    let exp = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or(FailureReason::MalformedClaims)?;

    Ok((subject, exp, claims))
}
