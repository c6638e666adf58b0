use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use firegate_auth::{
    FailureReason, FixedClock, IssuerSelector, MemoryKeyStore, TokenVerifier,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

const K1_KEY: &str = include_str!("fixtures/k1.key.pem");
const K2_KEY: &str = include_str!("fixtures/k2.key.pem");
const GOOGLE_X509: &str = include_str!("fixtures/google_x509.json");

const ISS: &str = "https://example.com/proj";

fn now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    i64::try_from(secs).unwrap()
}

fn sign(claims: &Value, private_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("k1".to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

fn verifier() -> TokenVerifier {
    let keys = Arc::new(MemoryKeyStore::new());
    keys.load_json(GOOGLE_X509).unwrap();
    TokenVerifier::new(keys)
}

#[test]
fn token_signed_by_published_key_is_accepted() {
    let token = sign(
        &json!({"iss": ISS, "sub": "user-42", "exp": now() + 3600}),
        K1_KEY,
    );
    let verified = verifier()
        .verify(&token, &IssuerSelector::Literal(ISS.to_string()))
        .unwrap();
    assert_eq!(verified.subject, "user-42");
    assert_eq!(verified.iss(), Some(ISS));
    assert!(verified.claim("exp").is_some());
}

#[test]
fn token_signed_by_other_key_is_invalid_signature() {
    let token = sign(
        &json!({"iss": ISS, "sub": "user-42", "exp": now() + 3600}),
        K2_KEY,
    );
    assert_eq!(
        verifier().verify(&token, &IssuerSelector::Literal(ISS.to_string())),
        Err(FailureReason::InvalidSignature)
    );
}

#[test]
fn token_for_other_project_is_issuer_mismatch() {
    let token = sign(
        &json!({"iss": "https://example.com/other", "sub": "user-42", "exp": now() + 3600}),
        K1_KEY,
    );
    assert_eq!(
        verifier().verify(&token, &IssuerSelector::Literal(ISS.to_string())),
        Err(FailureReason::IssuerMismatch)
    );
}

#[test]
fn firebase_profile_from_config() {
    let catalog = firegate_core::parse_catalog(
        r#"
        [profiles.default]
        project_id = "demo-project"
        "#,
        Path::new("."),
    )
    .unwrap();

    let issued_at = 1_700_000_000;
    let verifier = verifier()
        .with_resolver(Arc::new(catalog))
        .with_clock(Arc::new(FixedClock(issued_at)));
    let selector = IssuerSelector::Profile("default".to_string());

    let token = sign(
        &json!({
            "iss": "https://securetoken.google.com/demo-project",
            "aud": "demo-project",
            "sub": "uid-1",
            "user_id": "uid-1",
            "iat": issued_at,
            "exp": issued_at + 3600,
        }),
        K1_KEY,
    );
    let verified = verifier.verify(&token, &selector).unwrap();
    assert_eq!(verified.subject, "uid-1");
    assert_eq!(verified.claim("aud"), Some(&json!("demo-project")));

    let late = verifier.clone().with_clock(Arc::new(FixedClock(issued_at + 3600)));
    assert_eq!(late.verify(&token, &selector), Err(FailureReason::Expired));
}

#[test]
fn rotated_key_set_drops_old_kid() {
    let keys = Arc::new(MemoryKeyStore::new());
    keys.load_json(GOOGLE_X509).unwrap();
    let verifier = TokenVerifier::new(keys.clone());
    let token = sign(
        &json!({"iss": ISS, "sub": "user-42", "exp": now() + 3600}),
        K1_KEY,
    );
    let selector = IssuerSelector::Literal(ISS.to_string());
    assert!(verifier.verify(&token, &selector).is_ok());

    let cert = json!({"k2": include_str!("fixtures/k1.cert.pem")});
    keys.load_json(&cert.to_string()).unwrap();
    assert_eq!(
        verifier.verify(&token, &selector),
        Err(FailureReason::UnknownOrInvalidKey)
    );
}

#[test]
fn concurrent_verification_agrees() {
    let verifier = Arc::new(verifier());
    let token = Arc::new(sign(
        &json!({"iss": ISS, "sub": "user-42", "exp": now() + 3600}),
        K1_KEY,
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let verifier = Arc::clone(&verifier);
            let token = Arc::clone(&token);
            std::thread::spawn(move || {
                verifier
                    .verify(&token, &IssuerSelector::Literal(ISS.to_string()))
                    .map(|v| v.subject)
            })
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap(), Ok("user-42".to_string()));
    }
}
