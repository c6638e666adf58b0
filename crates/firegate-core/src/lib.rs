use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use firegate_api::{FiregateError, IssuerResolver, ProfileId, firebase_issuer};
use serde::{Deserialize, Serialize};

pub const PROFILES_FILE: &str = "profiles.toml";
pub const GOOGLE_SECURETOKEN_CERTS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub issuer: String,
}

/// Where the public key set comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Url(String),
    File(PathBuf),
}

impl Default for KeySource {
    fn default() -> Self {
        KeySource::Url(GOOGLE_SECURETOKEN_CERTS_URL.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCatalog {
    pub profiles: BTreeMap<ProfileId, Profile>,
    pub keys: KeySource,
}

impl ProfileCatalog {
    pub fn get(&self, profile: &str) -> Option<&Profile> {
        self.profiles.get(profile)
    }
}

impl IssuerResolver for ProfileCatalog {
    fn resolve_issuer(&self, profile: &str) -> Result<String, FiregateError> {
        self.get(profile)
            .map(|p| p.issuer.clone())
            .ok_or_else(|| FiregateError::NotFound(format!("profile {profile} not found")))
    }
}

pub fn validate_catalog(catalog: &ProfileCatalog) -> Result<(), FiregateError> {
    for (id, profile) in &catalog.profiles {
        if profile.issuer.trim().is_empty() {
            return Err(FiregateError::Validation(format!(
                "profile {id} does not define an issuer"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    keys: Option<RawKeys>,
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
}

#[derive(Debug, Deserialize)]
struct RawKeys {
    url: Option<String>,
    file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    issuer: Option<String>,
    project_id: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("firegate")
    } else {
        PathBuf::from(".firegate")
    }
}

pub fn load_catalog_from_dir(dir: &Path) -> Result<ProfileCatalog, FiregateError> {
    let path = dir.join(PROFILES_FILE);
    load_catalog_from_file(&path)
}

pub fn load_catalog_from_file(path: &Path) -> Result<ProfileCatalog, FiregateError> {
    let content = fs::read_to_string(path)
        .map_err(|e| FiregateError::NotFound(format!("failed to read {}: {e}", path.display())))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_catalog(&content, base)
        .map_err(|e| FiregateError::Validation(format!("{}: {e}", path.display())))
}

/// Parse a catalog from TOML. Relative key file paths are resolved against `base`.
pub fn parse_catalog(content: &str, base: &Path) -> Result<ProfileCatalog, FiregateError> {
    let raw: RawCatalog = toml::from_str(content)
        .map_err(|e| FiregateError::Validation(format!("invalid TOML: {e}")))?;

    let keys = match raw.keys {
        None => KeySource::default(),
        Some(RawKeys {
            url: Some(_),
            file: Some(_),
        }) => {
            return Err(FiregateError::Validation(
                "[keys] must set either url or file, not both".to_string(),
            ));
        }
        Some(RawKeys {
            file: Some(file), ..
        }) => KeySource::File(base.join(file)),
        Some(RawKeys { url: Some(url), .. }) => KeySource::Url(url),
        Some(RawKeys {
            url: None,
            file: None,
        }) => KeySource::default(),
    };

    let profiles = raw
        .profiles
        .into_iter()
        .map(|(id, p)| {
            let issuer = match (p.issuer, p.project_id) {
                (Some(issuer), _) => issuer,
                (None, Some(project)) if !project.trim().is_empty() => firebase_issuer(&project),
                (None, _) => String::new(),
            };
            (id.clone(), Profile { id, issuer })
        })
        .collect();

    let catalog = ProfileCatalog { profiles, keys };
    validate_catalog(&catalog)?;
    Ok(catalog)
}

pub fn write_default_config_file(dir: &Path, force: bool) -> Result<PathBuf, FiregateError> {
    fs::create_dir_all(dir).map_err(|e| {
        FiregateError::Internal(format!("failed to create {}: {e}", dir.display()))
    })?;

    let path = dir.join(PROFILES_FILE);
    if force || !path.exists() {
        fs::write(
            &path,
            include_str!("../../../docs/firegate/profiles.toml.example"),
        )
        .map_err(|e| FiregateError::Internal(format!("failed to write {}: {e}", path.display())))?;
    }
    Ok(path)
}
