use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use firegate_auth::{IssuerSelector, TokenVerifier, VerifiedToken};
use firegate_core::{KeySource, ProfileCatalog};

use crate::commands::keys::load_key_store;

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Token to verify, or `-` to read it from stdin
    pub token: String,

    /// Expected issuer, used verbatim
    #[arg(long, conflicts_with_all = ["profile", "project"])]
    pub issuer: Option<String>,

    /// Config profile that names the expected issuer
    #[arg(long, conflicts_with = "project")]
    pub profile: Option<String>,

    /// Firebase project id (issuer https://securetoken.google.com/<id>)
    #[arg(long)]
    pub project: Option<String>,

    /// Key set file (Google X.509 map or JWKS)
    #[arg(long, conflicts_with = "keys_url")]
    pub keys: Option<PathBuf>,

    /// Key set URL
    #[arg(long)]
    pub keys_url: Option<String>,
}

/// Returns whether the token was accepted.
pub fn run(args: VerifyArgs, catalog: ProfileCatalog, json: bool) -> anyhow::Result<bool> {
    let selector = selector(&args)?;
    let source = match (args.keys, args.keys_url) {
        (Some(path), _) => KeySource::File(path),
        (None, Some(url)) => KeySource::Url(url),
        (None, None) => catalog.keys.clone(),
    };

    let keys = load_key_store(&source)?;
    let verifier = TokenVerifier::new(Arc::new(keys)).with_resolver(Arc::new(catalog));
    // Surface profile misconfiguration as an error before touching the token.
    verifier.resolve_issuer(&selector)?;

    let token = read_token(&args.token)?;
    match verifier.verify(&token, &selector) {
        Ok(verified) => {
            print_accepted(&verified, json)?;
            Ok(true)
        }
        Err(reason) => {
            crate::pout(
                json,
                serde_json::json!({"ok":false,"reason":reason.as_str()}),
                &format!("Token rejected: {} ({reason})", reason.as_str()),
            )?;
            Ok(false)
        }
    }
}

fn selector(args: &VerifyArgs) -> anyhow::Result<IssuerSelector> {
    Ok(match (&args.issuer, &args.profile, &args.project) {
        (Some(issuer), _, _) => IssuerSelector::Literal(issuer.clone()),
        (None, Some(profile), _) => IssuerSelector::Profile(profile.clone()),
        (None, None, Some(project)) => IssuerSelector::firebase_project(project),
        (None, None, None) => bail!("one of --issuer, --profile or --project is required"),
    })
}

fn read_token(arg: &str) -> anyhow::Result<String> {
    if arg != "-" {
        return Ok(arg.trim().to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read token from stdin")?;
    Ok(buf.trim().to_string())
}

fn print_accepted(verified: &VerifiedToken, json: bool) -> anyhow::Result<()> {
    let text = format!(
        "Token valid\nsubject: {}\nclaims: {}",
        verified.subject,
        serde_json::to_string_pretty(&verified.claims)?
    );
    crate::pout(
        json,
        serde_json::json!({"ok":true,"subject":verified.subject,"claims":verified.claims}),
        &text,
    )
}
