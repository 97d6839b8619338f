use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use url::Url;

use super::browser::{
    Browser, BrowserEvent, InterceptedRequest, PendingRequest, SyntheticResponse,
    FORM_CONTENT_TYPE,
};
use super::{AuthError, AuthMode, Session};
use crate::config::host_in_domain;

const ID_TOKEN_COOKIE_PREFIX: &str = "idtoken-";
const SAML_RESPONSE_FIELD: &str = "SAMLResponse";

/// Federated credential that still has to be exchanged for a session token.
#[derive(Clone, PartialEq, Eq)]
pub enum CapturedCredential {
    AuthorizationCode(String),
    SamlAssertion(String),
}

impl CapturedCredential {
    /// Body key used by `AdvanceAuthentication`.
    pub fn exchange_field(&self) -> &'static str {
        match self {
            CapturedCredential::AuthorizationCode(_) => "Code",
            CapturedCredential::SamlAssertion(_) => SAML_RESPONSE_FIELD,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            CapturedCredential::AuthorizationCode(value)
            | CapturedCredential::SamlAssertion(value) => value,
        }
    }
}

impl std::fmt::Debug for CapturedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            CapturedCredential::AuthorizationCode(_) => "AuthorizationCode",
            CapturedCredential::SamlAssertion(_) => "SamlAssertion",
        };
        write!(f, "{kind}({})", redact(self.value()))
    }
}

/// Result of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// Needs `AdvanceAuthentication` before it can be used.
    Exchange(CapturedCredential),
    /// Already a bearer credential; exchange is skipped.
    Bearer(String),
}

/// Extracts a credential from browser events.
#[async_trait]
pub trait CredentialCapture: Send + Sync {
    /// Inspect one event. Intercepted requests must be answered before returning.
    async fn inspect(
        &self,
        event: BrowserEvent,
        session: &mut Session,
        browser: &dyn Browser,
    ) -> Result<Option<Capture>, AuthError>;

    /// Whether the browser has to report intercepted requests for this strategy.
    fn needs_interception(&self) -> bool {
        false
    }
}

/// Holds the single capture of an attempt.
#[derive(Debug, Default)]
pub struct CaptureSlot {
    captured: Option<Capture>,
}

impl CaptureSlot {
    pub fn get(&self) -> Option<&Capture> {
        self.captured.as_ref()
    }

    pub fn take(&mut self) -> Option<Capture> {
        self.captured.take()
    }

    /// Run `event` through `strategy` unless the slot is already filled.
    /// Returns whether this event filled the slot.
    pub async fn feed(
        &mut self,
        strategy: &dyn CredentialCapture,
        event: BrowserEvent,
        session: &mut Session,
        browser: &dyn Browser,
    ) -> Result<bool, AuthError> {
        if self.captured.is_some() {
            event.release();
            return Ok(false);
        }
        match strategy.inspect(event, session, browser).await? {
            Some(capture) => {
                self.captured = Some(capture);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Captures the credential from requests the browser lets us intercept:
/// the `code` query parameter (OIDC) or the `SAMLResponse` POST field (SAML).
#[derive(Debug, Clone)]
pub struct InterceptionCapture {
    mode: AuthMode,
    identity_domain: String,
    saml_callback_path: String,
}

impl InterceptionCapture {
    pub fn new(
        mode: AuthMode,
        identity_domain: impl Into<String>,
        saml_callback_path: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            identity_domain: identity_domain.into(),
            saml_callback_path: saml_callback_path.into(),
        }
    }

    fn intercept(&self, pending: PendingRequest) -> Option<Capture> {
        let request = &pending.request;
        let in_domain = request
            .url
            .host_str()
            .is_some_and(|host| host_in_domain(host, &self.identity_domain));
        if !in_domain {
            pending.respond(None);
            return None;
        }

        match self.mode {
            AuthMode::Oidc => match authorization_code(&request.url) {
                Some(code) => {
                    info!(url = %strip_query(&request.url), "authorization code intercepted");
                    // The callback target is not meant to be loaded.
                    pending.respond(Some(SyntheticResponse::empty_ok()));
                    Some(Capture::Exchange(CapturedCredential::AuthorizationCode(code)))
                }
                None => {
                    pending.respond(None);
                    None
                }
            },
            AuthMode::Saml => {
                if !(request.is_post() && request.url.path().contains(&self.saml_callback_path)) {
                    pending.respond(None);
                    return None;
                }
                info!(url = %request.url, "SAML callback intercepted");
                let assertion = saml_response(request);
                pending.respond(None);
                assertion.map(|value| Capture::Exchange(CapturedCredential::SamlAssertion(value)))
            }
        }
    }
}

#[async_trait]
impl CredentialCapture for InterceptionCapture {
    async fn inspect(
        &self,
        event: BrowserEvent,
        _session: &mut Session,
        _browser: &dyn Browser,
    ) -> Result<Option<Capture>, AuthError> {
        match event {
            BrowserEvent::ResourceRequested(pending) => Ok(self.intercept(pending)),
            BrowserEvent::NavigationCompleted { .. } => Ok(None),
        }
    }

    fn needs_interception(&self) -> bool {
        true
    }
}

/// Captures an `idToken-*` cookie after the browser lands on an identity host.
/// Every cookie seen on the way is merged into the session jar.
#[derive(Debug, Clone)]
pub struct CookieScanCapture {
    identity_domain: String,
}

impl CookieScanCapture {
    pub fn new(identity_domain: impl Into<String>) -> Self {
        Self {
            identity_domain: identity_domain.into(),
        }
    }
}

#[async_trait]
impl CredentialCapture for CookieScanCapture {
    async fn inspect(
        &self,
        event: BrowserEvent,
        session: &mut Session,
        browser: &dyn Browser,
    ) -> Result<Option<Capture>, AuthError> {
        let url = match event {
            BrowserEvent::NavigationCompleted { url, success: true } => url,
            other => {
                other.release();
                return Ok(None);
            }
        };
        if !url
            .host_str()
            .is_some_and(|host| host_in_domain(host, &self.identity_domain))
        {
            return Ok(None);
        }

        let cookies = match browser.cookies(&url).await {
            Ok(cookies) => cookies,
            Err(err) => {
                warn!(%url, error = %err, "unable to read browser cookies");
                return Ok(None);
            }
        };
        debug!(%url, count = cookies.len(), "scanned browser cookies");

        let bearer = cookies
            .iter()
            .find(|cookie| {
                cookie
                    .name
                    .to_ascii_lowercase()
                    .starts_with(ID_TOKEN_COOKIE_PREFIX)
                    && !cookie.value.is_empty()
            })
            .map(|cookie| cookie.value.clone());
        session.cookies_mut().merge(cookies);

        if bearer.is_some() {
            info!(%url, "identity token cookie found");
        }
        Ok(bearer.map(Capture::Bearer))
    }
}

/// Value of the `code` query parameter, matched case-insensitively and URL-decoded.
pub fn authorization_code(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("code"))
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// `SAMLResponse` field of a form-encoded callback body.
///
/// A declared non-form content type or a missing field is a soft failure:
/// it is logged and yields `None`.
pub fn saml_response(request: &InterceptedRequest) -> Option<String> {
    if let Some(content_type) = request.content_type.as_deref() {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if !essence.eq_ignore_ascii_case(FORM_CONTENT_TYPE) {
            warn!(content_type, "SAML callback body is not form-encoded; skipping");
            return None;
        }
    }
    let body = request.body.as_deref().unwrap_or_default();
    let value = form_urlencoded::parse(body.as_bytes())
        .find(|(key, _)| key.eq_ignore_ascii_case(SAML_RESPONSE_FIELD))
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty());
    if value.is_none() {
        warn!(body_len = body.len(), "SAML callback carried no SAMLResponse field");
    }
    value
}

/// Short, log-safe rendition of a secret.
pub(crate) fn redact(secret: &str) -> String {
    let head: String = secret.chars().take(4).collect();
    format!("{head}... ({} chars)", secret.chars().count())
}

fn strip_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
