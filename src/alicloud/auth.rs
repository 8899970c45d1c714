//! Alibaba Cloud Authentication
//!
//! Resolves access keys and regions from the connection config, the Alibaba
//! Cloud CLI profile file (`~/.aliyun/config.json`) and environment variables.

use super::error::ConfigurationError;
use crate::config::ConnectionConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Region used when nothing else is configured
pub const DEFAULT_REGION: &str = "cn-hangzhou";

/// Access key id variables, highest precedence first
pub const ACCESS_KEY_VARS: &[&str] = &[
    "ALIBABACLOUD_ACCESS_KEY_ID",
    "ALICLOUD_ACCESS_KEY_ID",
    "ALICLOUD_ACCESS_KEY",
];

/// Access key secret variables, highest precedence first
pub const SECRET_KEY_VARS: &[&str] = &[
    "ALIBABACLOUD_ACCESS_KEY_SECRET",
    "ALICLOUD_ACCESS_KEY_SECRET",
    "ALICLOUD_SECRET_KEY",
];

/// Region variables, highest precedence first
pub const REGION_VARS: &[&str] = &["ALIBABACLOUD_REGION_ID", "ALICLOUD_REGION_ID", "ALICLOUD_REGION"];

/// Snapshot of the environment variables consulted during resolution
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl Environment {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
        }
    }

    /// Build an environment from explicit pairs (no home directory)
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            home: None,
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Look up a variable; empty values count as unset
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First set variable among `keys`
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.var(k))
    }

    /// Path of the Alibaba Cloud CLI config file
    pub fn aliyun_config_path(&self) -> Option<PathBuf> {
        self.home.as_ref().map(|h| h.join(".aliyun").join("config.json"))
    }
}

/// Resolved access key pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"********")
            .finish()
    }
}

/// One profile entry of `~/.aliyun/config.json`
#[derive(Debug, Clone, Deserialize)]
struct CliProfile {
    name: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    access_key_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
    #[serde(default)]
    profiles: Vec<CliProfile>,
}

/// Read an AK-mode profile from the CLI config file
fn load_profile(profile: &str, path: &Path) -> Result<Credentials, ConfigurationError> {
    let profile_err = |reason: String| ConfigurationError::Profile {
        profile: profile.to_string(),
        reason,
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| profile_err(format!("cannot read {}: {}", path.display(), e)))?;
    let config: CliConfig = serde_json::from_str(&content)
        .map_err(|e| profile_err(format!("cannot parse {}: {}", path.display(), e)))?;

    let entry = config
        .profiles
        .into_iter()
        .find(|p| p.name == profile)
        .ok_or_else(|| profile_err(format!("not found in {}", path.display())))?;

    if !entry.mode.eq_ignore_ascii_case("AK") {
        return Err(profile_err(format!("unsupported mode '{}', only AK is supported", entry.mode)));
    }
    if entry.access_key_id.is_empty() || entry.access_key_secret.is_empty() {
        return Err(profile_err("access_key_id and access_key_secret must be set".to_string()));
    }

    Ok(Credentials {
        access_key_id: entry.access_key_id,
        access_key_secret: entry.access_key_secret,
    })
}

/// Resolve credentials for a connection.
///
/// Each half of the key pair is taken from the connection config first, then
/// from the first set variable of [`ACCESS_KEY_VARS`] / [`SECRET_KEY_VARS`].
/// A configured `profile` stands in for explicit keys when none are given.
pub fn resolve_credentials(
    config: &ConnectionConfig,
    env: &Environment,
) -> Result<Credentials, ConfigurationError> {
    if config.access_key.is_none() && config.secret_key.is_none() {
        if let Some(profile) = config.profile.as_deref() {
            let path = env.aliyun_config_path().ok_or_else(|| ConfigurationError::Profile {
                profile: profile.to_string(),
                reason: "cannot locate home directory".to_string(),
            })?;
            tracing::debug!("Loading credentials from profile {} in {:?}", profile, path);
            return load_profile(profile, &path);
        }
    }

    let access_key_id = config
        .access_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| env.first_of(ACCESS_KEY_VARS).map(str::to_string))
        .ok_or(ConfigurationError::MissingCredentials { field: "access_key" })?;

    let access_key_secret = config
        .secret_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| env.first_of(SECRET_KEY_VARS).map(str::to_string))
        .ok_or(ConfigurationError::MissingCredentials { field: "secret_key" })?;

    Ok(Credentials {
        access_key_id,
        access_key_secret,
    })
}

/// Validate an Alibaba Cloud region id against the known region list
pub fn validate_region(region: &str) -> bool {
    list_regions().contains(&region)
}

/// Expand a configured region, which may end in a `*` wildcard (`cn-*`)
pub fn expand_region(pattern: &str) -> Result<Vec<String>, ConfigurationError> {
    let expanded: Vec<String> = match pattern.strip_suffix('*') {
        Some(prefix) => list_regions()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .map(|r| r.to_string())
            .collect(),
        None if validate_region(pattern) => vec![pattern.to_string()],
        None => Vec::new(),
    };

    if expanded.is_empty() {
        return Err(ConfigurationError::InvalidRegion {
            region: pattern.to_string(),
        });
    }
    Ok(expanded)
}

/// Resolve the region used by tables that have no per-row region.
///
/// Precedence: first configured region, then [`REGION_VARS`], then
/// [`DEFAULT_REGION`]. Invalid environment values are skipped with a warning.
pub fn default_region(
    config: &ConnectionConfig,
    env: &Environment,
) -> Result<String, ConfigurationError> {
    if let Some(first) = config.regions.first() {
        let expanded = expand_region(first)?;
        return Ok(expanded[0].clone());
    }

    for key in REGION_VARS {
        if let Some(region) = env.var(key) {
            if validate_region(region) {
                return Ok(region.to_string());
            }
            tracing::warn!("Ignoring invalid region '{}' in {}", region, key);
        }
    }

    Ok(DEFAULT_REGION.to_string())
}

/// Resolve every region the connection queries, in configured order
pub fn resolve_regions(
    config: &ConnectionConfig,
    env: &Environment,
) -> Result<Vec<String>, ConfigurationError> {
    if config.regions.is_empty() {
        return Ok(vec![default_region(config, env)?]);
    }

    let mut regions: Vec<String> = Vec::new();
    for pattern in &config.regions {
        for region in expand_region(pattern)? {
            if !regions.contains(&region) {
                regions.push(region);
            }
        }
    }
    Ok(regions)
}

/// Known Alibaba Cloud public regions
pub fn list_regions() -> &'static [&'static str] {
    &[
        // Mainland China
        "cn-qingdao",
        "cn-beijing",
        "cn-zhangjiakou",
        "cn-huhehaote",
        "cn-wulanchabu",
        "cn-hangzhou",
        "cn-shanghai",
        "cn-nanjing",
        "cn-fuzhou",
        "cn-wuhan-lr",
        "cn-shenzhen",
        "cn-heyuan",
        "cn-guangzhou",
        "cn-chengdu",
        "cn-hongkong",
        // Asia Pacific
        "ap-northeast-1",
        "ap-northeast-2",
        "ap-southeast-1",
        "ap-southeast-2",
        "ap-southeast-3",
        "ap-southeast-5",
        "ap-southeast-6",
        "ap-southeast-7",
        "ap-south-1",
        // Europe & Americas
        "us-east-1",
        "us-west-1",
        "eu-west-1",
        "eu-central-1",
        // Middle East
        "me-east-1",
        "me-central-1",
    ]
}
