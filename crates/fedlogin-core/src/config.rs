use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::CaptureStrategy;

pub const DEFAULT_IDENTITY_DOMAIN: &str = "id.cyberark.cloud";
pub const DEFAULT_RESOURCE_DOMAIN: &str = "privilegecloud.cyberark.cloud";
pub const DEFAULT_ACCOUNTS_PATH: &str = "/PasswordVault/API/Accounts";
pub const DEFAULT_SAML_CALLBACK_PATH: &str = "/auth/saml/callback";

const ENV_PREFIX: &str = "FEDLOGIN_";

/// Locates the per-user configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Discover the configuration directory. Nothing is created on disk.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("app", "fedlogin", "fedlogin")
            .ok_or(ConfigError::MissingProjectDirs)?;
        Ok(Self {
            root: dirs.config_dir().to_path_buf(),
        })
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Path to the optional settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }
}

/// Tunables for an authentication attempt and the endpoints it talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub identity_domain: String,
    pub resource_domain: String,
    pub accounts_path: String,
    pub accounts_limit: u32,
    pub max_pod_redirects: u32,
    pub saml_callback_path: String,
    pub capture: CaptureStrategy,
    pub capture_timeout_secs: u64,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_origin: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_origin: Option<Url>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            identity_domain: DEFAULT_IDENTITY_DOMAIN.into(),
            resource_domain: DEFAULT_RESOURCE_DOMAIN.into(),
            accounts_path: DEFAULT_ACCOUNTS_PATH.into(),
            accounts_limit: 10,
            max_pod_redirects: 3,
            saml_callback_path: DEFAULT_SAML_CALLBACK_PATH.into(),
            capture: CaptureStrategy::Auto,
            capture_timeout_secs: 300,
            request_timeout_secs: 30,
            identity_origin: None,
            resource_origin: None,
        }
    }
}

impl AuthSettings {
    /// Load settings from the locator's settings file (if present) and apply
    /// `FEDLOGIN_*` environment overrides on top.
    pub fn load(locator: &ConfigLocator) -> Result<Self, ConfigError> {
        let mut settings = Self::from_file(locator)?;
        settings.apply_overrides(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        Ok(settings)
    }

    fn from_file(locator: &ConfigLocator) -> Result<Self, ConfigError> {
        let path = locator.settings_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Apply string overrides looked up by upper-case key (e.g. `IDENTITY_DOMAIN`).
    /// Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("IDENTITY_DOMAIN") {
            self.identity_domain = value.trim().trim_start_matches('.').to_owned();
        }
        if let Some(value) = get("RESOURCE_DOMAIN") {
            self.resource_domain = value.trim().trim_start_matches('.').to_owned();
        }
        if let Some(value) = get("ACCOUNTS_PATH") {
            self.accounts_path = value;
        }
        if let Some(value) = get("ACCOUNTS_LIMIT") {
            self.accounts_limit = parse_number("ACCOUNTS_LIMIT", &value)?;
        }
        if let Some(value) = get("MAX_POD_REDIRECTS") {
            self.max_pod_redirects = parse_number("MAX_POD_REDIRECTS", &value)?;
        }
        if let Some(value) = get("SAML_CALLBACK_PATH") {
            self.saml_callback_path = value;
        }
        if let Some(value) = get("CAPTURE") {
            self.capture = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CAPTURE",
                value,
            })?;
        }
        if let Some(value) = get("CAPTURE_TIMEOUT_SECS") {
            self.capture_timeout_secs = parse_number("CAPTURE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_number("REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("IDENTITY_ORIGIN") {
            self.identity_origin = Some(parse_origin("IDENTITY_ORIGIN", value)?);
        }
        if let Some(value) = get("RESOURCE_ORIGIN") {
            self.resource_origin = Some(parse_origin("RESOURCE_ORIGIN", value)?);
        }
        Ok(())
    }

    /// Initial identity base URL for a tenant: `https://{tenant}.{identity_domain}`
    /// unless an explicit origin is configured.
    pub fn identity_base(&self, tenant: &str) -> Result<Url, url::ParseError> {
        match &self.identity_origin {
            Some(origin) => Ok(origin.clone()),
            None => Url::parse(&format!(
                "https://{}.{}",
                tenant.trim().to_ascii_lowercase(),
                self.identity_domain
            )),
        }
    }

    /// Origin of the resource API for a subdomain.
    pub fn resource_base(&self, subdomain: &str) -> Result<Url, url::ParseError> {
        match &self.resource_origin {
            Some(origin) => Ok(origin.clone()),
            None => Url::parse(&format!(
                "https://{}.{}",
                subdomain.to_ascii_lowercase(),
                self.resource_domain
            )),
        }
    }

    /// Whether `host` is the identity domain itself or one of its subdomains.
    pub fn is_identity_host(&self, host: &str) -> bool {
        host_in_domain(host, &self.identity_domain)
    }

    /// Browser interception filter covering every identity host.
    pub fn interception_filter(&self) -> String {
        format!("https://*.{}/*", self.identity_domain)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `host` equals `domain` or is one of its subdomains (case-insensitive).
pub fn host_in_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
        })
}

fn parse_origin(key: &'static str, value: String) -> Result<Url, ConfigError> {
    match Url::parse(value.trim()) {
        Ok(url) if url.has_host() => Ok(url),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

/// Errors that can occur while locating or reading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for fedlogin")]
    MissingProjectDirs,
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
