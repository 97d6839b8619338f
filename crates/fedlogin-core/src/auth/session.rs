use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{AuthError, AuthMode};

/// Identifier of one authentication attempt. Strictly increasing per `AuthManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(pub(crate) u64);

impl AttemptId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inputs the user supplies before an attempt starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub tenant: String,
    pub user: String,
    pub mode: AuthMode,
}

impl LoginRequest {
    pub fn new(tenant: impl Into<String>, user: impl Into<String>, mode: AuthMode) -> Self {
        Self {
            tenant: tenant.into(),
            user: user.into(),
            mode,
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        let tenant = self.tenant.trim();
        if tenant.is_empty() {
            return Err(AuthError::InvalidInput("tenant identifier is empty"));
        }
        if !tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(AuthError::InvalidInput(
                "tenant identifier must be a host label",
            ));
        }
        if self.user.trim().is_empty() {
            return Err(AuthError::InvalidInput("user identifier is empty"));
        }
        Ok(())
    }
}

/// Cookie observed in the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: path.into(),
        }
    }

    /// Domain and path matching in the spirit of RFC 6265 §5.1.3/§5.1.4.
    pub fn applies_to(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let domain_ok =
            domain.is_empty() || host == domain || host.ends_with(&format!(".{domain}"));

        let path = url.path();
        let cookie_path = if self.path.is_empty() { "/" } else { &self.path };
        let path_ok = path == cookie_path
            || (path.starts_with(cookie_path)
                && (cookie_path.ends_with('/')
                    || path[cookie_path.len()..].starts_with('/')));

        domain_ok && path_ok
    }
}

/// Cookies keyed by name; later observations replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: BTreeMap<String, Cookie>,
}

impl CookieJar {
    pub fn merge<I>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = Cookie>,
    {
        for cookie in cookies {
            self.cookies.insert(cookie.name.clone(), cookie);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` header value for a request to `url`, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .values()
            .filter(|cookie| cookie.applies_to(url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

/// Mutable state of a single authentication attempt.
///
/// A fresh `Session` is built for every attempt; nothing carries over.
#[derive(Debug, Clone)]
pub struct Session {
    attempt: AttemptId,
    tenant: String,
    user: String,
    mode: AuthMode,
    base_url: Url,
    pod_redirects: u32,
    session_token: Option<String>,
    cookies: CookieJar,
    observed_host: Option<String>,
}

impl Session {
    pub fn new(attempt: AttemptId, request: &LoginRequest, base_url: Url) -> Self {
        Self {
            attempt,
            tenant: request.tenant.trim().to_owned(),
            user: request.user.trim().to_owned(),
            mode: request.mode,
            base_url,
            pod_redirects: 0,
            session_token: None,
            cookies: CookieJar::default(),
            observed_host: None,
        }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pod_redirects(&self) -> u32 {
        self.pod_redirects
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// Identity service endpoint below the current base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.base_url.join(path)?)
    }

    /// Rewrite the base URL to `{scheme}://{pod_fqdn}` when the hint names a
    /// different authority. Returns whether a rewrite happened.
    pub fn apply_pod_hint(&mut self, pod_fqdn: &str) -> Result<bool, AuthError> {
        let pod = pod_fqdn.trim().trim_end_matches('/');
        if pod.is_empty() || pod.eq_ignore_ascii_case(&authority(&self.base_url)) {
            return Ok(false);
        }
        let rewritten = Url::parse(&format!("{}://{}", self.base_url.scheme(), pod))?;
        if !rewritten.has_host() {
            return Err(AuthError::InvalidInput("pod hint is not a host name"));
        }
        self.base_url = rewritten;
        self.pod_redirects += 1;
        Ok(true)
    }

    /// Store the session token. Only the first token of an attempt is kept.
    pub fn set_session_token(&mut self, token: impl Into<String>) -> bool {
        if self.session_token.is_some() {
            return false;
        }
        self.session_token = Some(token.into());
        true
    }

    /// Remember the most recent identity host the browser landed on.
    pub fn observe_host(&mut self, host: &str) {
        self.observed_host = Some(host.to_ascii_lowercase());
    }

    /// Subdomain for the resource API: first label of the observed identity
    /// host, falling back to the tenant identifier.
    pub fn resource_subdomain(&self) -> String {
        self.observed_host
            .as_deref()
            .and_then(|host| host.split('.').next())
            .filter(|label| !label.is_empty())
            .unwrap_or(self.tenant.as_str())
            .to_ascii_lowercase()
    }
}

/// `host[:port]` of a URL.
pub(crate) fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        _ => String::new(),
    }
}
