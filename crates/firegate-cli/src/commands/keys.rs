use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Subcommand;
use firegate_auth::{KeySetFormat, MemoryKeyStore, parse_cache_control_max_age, parse_key_set};
use firegate_core::{KeySource, ProfileCatalog};
use reqwest::blocking::Client;
use reqwest::header;

const DEFAULT_MAX_AGE_SECONDS: u64 = 300;

#[derive(Debug, Subcommand)]
pub enum KeysCommands {
    /// Download a public key set and list its key ids
    Fetch {
        /// Key set URL (default: [keys] url from the config, else Google securetoken)
        #[arg(long)]
        url: Option<String>,
        /// Save the downloaded key set to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub struct FetchedKeySet {
    pub body: String,
    pub max_age_seconds: u64,
}

pub fn run(command: KeysCommands, catalog: &ProfileCatalog, json: bool) -> anyhow::Result<()> {
    match command {
        KeysCommands::Fetch { url, out } => {
            let url = match (url, &catalog.keys) {
                (Some(url), _) => url,
                (None, KeySource::Url(url)) => url.clone(),
                (None, KeySource::File(path)) => {
                    bail!("config reads keys from {}; pass --url to fetch", path.display())
                }
            };

            let fetched = fetch_key_set(&url)?;
            let set = parse_key_set(&fetched.body)?;
            let mut kids: Vec<String> = set.keys.into_iter().map(|(kid, _)| kid).collect();
            kids.sort();

            if let Some(out) = &out {
                fs::write(out, &fetched.body)
                    .with_context(|| format!("failed to write {}", out.display()))?;
            }

            let format = match set.format {
                KeySetFormat::X509 => "x509",
                KeySetFormat::Jwks => "jwks",
            };
            crate::pout(
                json,
                serde_json::json!({
                    "url": url,
                    "format": format,
                    "kids": kids,
                    "max_age_seconds": fetched.max_age_seconds,
                    "saved_to": out,
                }),
                &format!(
                    "Fetched {} key(s) [{}], cacheable for {}s",
                    kids.len(),
                    kids.join(", "),
                    fetched.max_age_seconds
                ),
            )
        }
    }
}

pub fn fetch_key_set(url: &str) -> anyhow::Result<FetchedKeySet> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

    let resp = client
        .get(url)
        .send()
        .with_context(|| format!("failed to fetch {url}"))?;
    if !resp.status().is_success() {
        bail!("fetch of {url} failed: {}", resp.status());
    }

    let max_age_seconds = resp
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .unwrap_or(DEFAULT_MAX_AGE_SECONDS);

    let body = resp.text()?;
    tracing::debug!(url, max_age_seconds, "key set fetched");
    Ok(FetchedKeySet {
        body,
        max_age_seconds,
    })
}

pub fn load_key_store(source: &KeySource) -> anyhow::Result<MemoryKeyStore> {
    let body = match source {
        KeySource::Url(url) => fetch_key_set(url)?.body,
        KeySource::File(path) => read_key_file(path)?,
    };
    let store = MemoryKeyStore::new();
    store.load_json(&body)?;
    Ok(store)
}

fn read_key_file(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_source_loads_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(
            &path,
            include_str!("../../../firegate-auth/tests/fixtures/google_x509.json"),
        )
        .unwrap();

        let store = load_key_store(&KeySource::File(path)).unwrap();
        assert_eq!(store.kids(), vec!["k1".to_string()]);
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let err = load_key_store(&KeySource::File(PathBuf::from("/nonexistent/keys.json")))
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
