//! Key material: published key sets and their conversion into verification keys.

use std::str::FromStr;

use crate::{Error, Result};

use firegate_api::{Jwk, KeyId, PublicKey};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;

/// Shape of a published key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySetFormat {
    /// `{"<kid>": "-----BEGIN CERTIFICATE-----..."}`, as served by Google's `securetoken` endpoint.
    X509,
    /// `{"keys": [ {jwk}, ... ]}`.
    Jwks,
}

/// A parsed key set, ready to be loaded into a key store.
#[derive(Debug, Clone)]
pub struct KeySet {
    pub format: KeySetFormat,
    pub keys: Vec<(KeyId, PublicKey)>,
}

/// Parse either a Google X.509 certificate map or a JWKS document.
///
/// JWKS entries without a `kid` are skipped since they cannot be addressed.
pub fn parse_key_set(json: &str) -> Result<KeySet> {
    let doc: Value = serde_json::from_str(json)?;
    let Value::Object(map) = doc else {
        return Err(Error::KeySet("key set must be a JSON object".to_string()));
    };

    let set = if let Some(keys) = map.get("keys") {
        let jwks: Vec<Jwk> = serde_json::from_value(keys.clone())?;
        KeySet {
            format: KeySetFormat::Jwks,
            keys: jwks
                .into_iter()
                .filter_map(|jwk| {
                    let kid = jwk.kid.clone().filter(|k| !k.is_empty())?;
                    Some((kid, PublicKey::Jwk(jwk)))
                })
                .collect(),
        }
    } else {
        let mut keys = Vec::with_capacity(map.len());
        for (kid, value) in map {
            let pem = value
                .as_str()
                .ok_or_else(|| Error::KeySet(format!("certificate for {kid} is not a string")))?;
            keys.push((kid, PublicKey::Pem(pem.to_string())));
        }
        KeySet {
            format: KeySetFormat::X509,
            keys,
        }
    };

    if set.keys.is_empty() {
        return Err(Error::KeySet("key set contains no usable keys".to_string()));
    }
    Ok(set)
}

/// Turn stored key material into a key usable for `alg`.
///
/// Symmetric algorithms never have a public key and are always rejected.
pub fn decoding_key(key: &PublicKey, alg: Algorithm) -> Result<DecodingKey> {
    match key {
        PublicKey::Pem(pem) => decoding_key_from_pem(pem.as_bytes(), alg),
        PublicKey::Jwk(jwk) => decoding_key_from_jwk(jwk, alg),
    }
}

fn decoding_key_from_pem(pem: &[u8], alg: Algorithm) -> Result<DecodingKey> {
    match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Ok(DecodingKey::from_rsa_pem(pem)?),
        Algorithm::ES256 | Algorithm::ES384 => Ok(DecodingKey::from_ec_pem(pem)?),
        Algorithm::EdDSA => Ok(DecodingKey::from_ed_pem(pem)?),
        other => Err(Error::Key(format!("no public key for {other:?}"))),
    }
}

fn decoding_key_from_jwk(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey> {
    if let Some(declared) = jwk.alg.as_deref() {
        let declared = Algorithm::from_str(declared)
            .map_err(|_| Error::Key(format!("unknown JWK alg: {declared}")))?;
        if declared != alg {
            return Err(Error::Key(format!(
                "JWK is for {declared:?}, token uses {alg:?}"
            )));
        }
    }

    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| Error::Key("RSA JWK missing n".to_string()))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| Error::Key("RSA JWK missing e".to_string()))?;
            Ok(DecodingKey::from_rsa_components(n, e)?)
        }
        "EC" => {
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| Error::Key("EC JWK missing x".to_string()))?;
            let y = jwk
                .y
                .as_deref()
                .ok_or_else(|| Error::Key("EC JWK missing y".to_string()))?;
            Ok(DecodingKey::from_ec_components(x, y)?)
        }
        "OKP" => {
            let crv = jwk.crv.as_deref().unwrap_or("");
            if crv != "Ed25519" {
                return Err(Error::Key(format!("unsupported OKP curve: {crv}")));
            }
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| Error::Key("OKP JWK missing x".to_string()))?;
            Ok(DecodingKey::from_ed_components(x)?)
        }
        other => Err(Error::Key(format!("unsupported kty: {other}"))),
    }
}

/// Extract `max-age` from a `Cache-Control` header value.
pub fn parse_cache_control_max_age(cc: &str) -> Option<u64> {
    for part in cc.split(',') {
        let p = part.trim();
        if let Some(rest) = p.strip_prefix("max-age=") {
            if let Ok(n) = rest.trim().parse::<u64>() {
                return Some(n);
            }
        }
    }
    None
}
