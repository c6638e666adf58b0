//! firegate-auth
//!
//! Verification of identity tokens issued by Firebase Authentication (or any
//! issuer publishing its signing keys by `kid`).
//!
//! - **`TokenVerifier`** runs the ordered check pipeline: header parse, issuer
//!   resolution, key lookup, signature and claims, expiry. Every rejection is a
//!   [`FailureReason`]; nothing is returned about the claims of a rejected token.
//! - **`MemoryKeyStore`** is a concurrent `kid -> PublicKey` table that an external
//!   refresher fills from the provider's published key set.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use firegate_auth::{IssuerSelector, MemoryKeyStore, TokenVerifier};
//!
//! # fn demo(certs_json: &str, token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let keys = Arc::new(MemoryKeyStore::new());
//! keys.load_json(certs_json)?;
//!
//! let verifier = TokenVerifier::new(keys);
//! match verifier.verify(token, &IssuerSelector::firebase_project("my-project")) {
//!     Ok(verified) => println!("sub={}", verified.subject),
//!     Err(reason) => println!("rejected: {reason}"),
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod clock;
mod error;
mod keys;
mod keystore;
mod verifier;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use firegate_api::{
    Claims, FailureReason, IssuerResolver, IssuerSelector, Jwk, KeyStore, PublicKey,
    VerificationResult, VerifiedToken,
};
pub use keys::{KeySet, KeySetFormat, decoding_key, parse_cache_control_max_age, parse_key_set};
pub use keystore::MemoryKeyStore;
pub use verifier::{TokenVerifier, VerifyOptions};
