use serde::{Deserialize, Serialize};

/// Federation mechanism used by the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Oidc,
    Saml,
}

/// How the federated credential is pulled out of the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureStrategy {
    /// Interception when the browser supports it, cookie scanning otherwise.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "interception")]
    Interception,
    #[serde(rename = "cookie", alias = "cookie-scan")]
    CookieScan,
}

impl CaptureStrategy {
    /// Resolve `Auto` against the browser's capabilities.
    pub fn resolve(self, interception_supported: bool) -> Self {
        match self {
            CaptureStrategy::Auto if interception_supported => CaptureStrategy::Interception,
            CaptureStrategy::Auto => CaptureStrategy::CookieScan,
            other => other,
        }
    }
}

impl std::str::FromStr for AuthMode {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oidc" | "openid" => Ok(AuthMode::Oidc),
            "saml" => Ok(AuthMode::Saml),
            other => Err(InvalidChoice(other.to_owned())),
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            AuthMode::Oidc => "OIDC",
            AuthMode::Saml => "SAML",
        };
        write!(f, "{value}")
    }
}

impl std::str::FromStr for CaptureStrategy {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CaptureStrategy::Auto),
            "interception" | "intercept" => Ok(CaptureStrategy::Interception),
            "cookie" | "cookie-scan" | "cookies" => Ok(CaptureStrategy::CookieScan),
            other => Err(InvalidChoice(other.to_owned())),
        }
    }
}

impl std::fmt::Display for CaptureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            CaptureStrategy::Auto => "auto",
            CaptureStrategy::Interception => "interception",
            CaptureStrategy::CookieScan => "cookie",
        };
        write!(f, "{value}")
    }
}

/// Error reported when parsing an unsupported mode or strategy.
#[derive(Debug, thiserror::Error)]
#[error("invalid choice '{0}'")]
pub struct InvalidChoice(pub String);
