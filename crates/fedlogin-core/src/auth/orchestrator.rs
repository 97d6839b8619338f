use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use super::browser::{AttemptEvents, Browser, BrowserEvent, BrowserEvents};
use super::capture::{
    redact, Capture, CaptureSlot, CookieScanCapture, CredentialCapture, InterceptionCapture,
};
use super::challenge::resolve_challenge;
use super::identity::IdentityClient;
use super::pod::resolve_pod;
use super::{
    AttemptId, AuthError, AuthMode, AuthObserver, CaptureStrategy, FailureKind, LoginRequest,
    Session, TokenClaims,
};
use crate::accounts::{Account, AccountsClient};
use crate::config::AuthSettings;

/// Where the bearer credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Exchange,
    Cookie,
}

/// Result of a completed login.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub attempt: AttemptId,
    pub token: String,
    pub source: TokenSource,
    pub base_url: Url,
    pub resource_subdomain: String,
    pub claims: Option<TokenClaims>,
}

#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Completed {
        session: AuthenticatedSession,
        accounts: Vec<Account>,
    },
    /// StartAuthentication settled without a usable identity-provider redirect.
    NoRedirect { reason: String },
}

/// Runs authentication attempts: tenant routing, browser redirect, credential
/// capture, token exchange and the first accounts call.
///
/// Only one attempt runs at a time; the browser event stream doubles as the
/// in-flight guard.
pub struct AuthManager<B> {
    identity: IdentityClient,
    accounts: AccountsClient,
    browser: B,
    events: Mutex<BrowserEvents>,
    settings: AuthSettings,
    last_attempt: AtomicU64,
}

impl<B> AuthManager<B>
where
    B: Browser,
{
    pub fn new(settings: AuthSettings, browser: B, events: BrowserEvents) -> Result<Self, AuthError> {
        Ok(Self {
            identity: IdentityClient::new(settings.request_timeout())?,
            accounts: AccountsClient::new(&settings)?,
            browser,
            events: Mutex::new(events),
            settings,
            last_attempt: AtomicU64::new(0),
        })
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    /// Whether an attempt currently holds the browser event stream.
    pub fn is_busy(&self) -> bool {
        self.events.try_lock().is_err()
    }

    /// Run one attempt end to end.
    ///
    /// Failures are reported to `observer` before being returned. Dropping the
    /// returned future abandons the attempt; browser events still tagged with
    /// it are ignored by the next one.
    pub async fn authenticate(
        &self,
        request: &LoginRequest,
        observer: &dyn AuthObserver,
    ) -> Result<AttemptOutcome, AuthError> {
        let Ok(mut events) = self.events.try_lock() else {
            let err = AuthError::AttemptInProgress;
            report_failure(observer, None, &err);
            return Err(err);
        };
        let attempt = AttemptId(self.last_attempt.fetch_add(1, Ordering::SeqCst) + 1);
        let mut subscription = events.subscribe(attempt);

        let span = info_span!("attempt", %attempt, tenant = %request.tenant, mode = %request.mode);
        let result = self
            .run(request, &mut subscription, observer)
            .instrument(span)
            .await;
        if let Err(err) = &result {
            report_failure(observer, Some(attempt), err);
        }
        result
    }

    async fn run(
        &self,
        request: &LoginRequest,
        events: &mut AttemptEvents<'_>,
        observer: &dyn AuthObserver,
    ) -> Result<AttemptOutcome, AuthError> {
        request.validate()?;
        let attempt = events.attempt();
        let mut session = Session::new(
            attempt,
            request,
            self.settings.identity_base(&request.tenant)?,
        );

        notify(
            observer,
            format!(
                "Step 1: Contacting StartAuthentication at {} for {} ({})...",
                session.base_url(),
                session.user(),
                session.mode()
            ),
        );
        let challenge =
            match resolve_pod(&self.identity, &mut session, self.settings.max_pod_redirects).await {
                Ok(response) => {
                    if session.pod_redirects() > 0 {
                        notify(
                            observer,
                            format!("Tenant is served from {}", session.base_url()),
                        );
                    }
                    if !response.success {
                        if let Some(message) = response.message.as_deref() {
                            notify(observer, format!("StartAuthentication reported: {message}"));
                        }
                    }
                    Some(resolve_challenge(&response.result))
                }
                Err(AuthError::Protocol {
                    endpoint,
                    message,
                    body,
                }) => {
                    warn!(endpoint, %message, "unparseable identity response");
                    notify(
                        observer,
                        format!("Error parsing {endpoint} response: {message}. Raw body: {body}"),
                    );
                    None
                }
                Err(err) => return Err(err),
            };

        let redirect = match challenge.as_ref().and_then(|c| c.redirect_url()) {
            Some(raw) => match Url::parse(raw) {
                Ok(url) => url,
                Err(err) => {
                    return Ok(no_redirect(
                        observer,
                        format!("no redirect: URL '{raw}' is not usable ({err})"),
                    ))
                }
            },
            None => {
                let reason = challenge
                    .as_ref()
                    .map(|c| c.describe())
                    .unwrap_or_else(|| "no redirect URL found in response".into());
                return Ok(no_redirect(observer, reason));
            }
        };

        let strategy = self.strategy_for(session.mode())?;
        if strategy.needs_interception() {
            self.browser
                .enable_interception(&self.settings.interception_filter())
                .await?;
        }
        notify(observer, "Redirecting browser to the identity provider...");
        debug!(url = %redirect, "navigating");
        self.browser.navigate(attempt, &redirect).await?;

        let timeout = self.settings.capture_timeout();
        let capture = tokio::time::timeout(
            timeout,
            self.await_capture(&mut session, events, strategy.as_ref()),
        )
        .await
        .map_err(|_| AuthError::CaptureTimedOut(timeout))??;
        events.close();

        let (token, source) = match capture {
            Capture::Bearer(token) => {
                notify(
                    observer,
                    "Identity token cookie captured; token exchange not needed.",
                );
                (token, TokenSource::Cookie)
            }
            Capture::Exchange(credential) => {
                notify(
                    observer,
                    format!(
                        "Step 2: Exchanging {} {} via AdvanceAuthentication...",
                        credential.exchange_field(),
                        redact(credential.value())
                    ),
                );
                let exchanged = self
                    .identity
                    .advance_authentication(session.base_url(), &credential)
                    .await?;
                if let Some(pod) = exchanged.pod_fqdn.as_deref() {
                    self.follow_exchange_pod(&mut session, pod);
                }
                notify(observer, "Authentication successful. Session token acquired.");
                (exchanged.token, TokenSource::Exchange)
            }
        };
        if !session.set_session_token(token) {
            warn!("session token already set; keeping the first one");
        }
        let token = session.session_token().unwrap_or_default().to_owned();

        let subdomain = session.resource_subdomain();
        notify(
            observer,
            format!("Step 3: Fetching accounts for '{subdomain}'..."),
        );
        let accounts = self
            .accounts
            .list_accounts(&subdomain, &token, Some(session.cookies()))
            .await?;
        notify(
            observer,
            format!("Displaying {} accounts.", accounts.len()),
        );
        observer.display_accounts(&accounts);

        Ok(AttemptOutcome::Completed {
            session: AuthenticatedSession {
                attempt,
                claims: TokenClaims::peek(&token),
                token,
                source,
                base_url: session.base_url().clone(),
                resource_subdomain: subdomain,
            },
            accounts,
        })
    }

    fn strategy_for(&self, mode: AuthMode) -> Result<Box<dyn CredentialCapture>, AuthError> {
        let interception = self.browser.supports_interception();
        match self.settings.capture.resolve(interception) {
            CaptureStrategy::CookieScan => Ok(Box::new(CookieScanCapture::new(
                self.settings.identity_domain.clone(),
            ))),
            _ if !interception => Err(AuthError::Browser(
                "browser cannot intercept requests; use cookie capture".into(),
            )),
            _ => Ok(Box::new(InterceptionCapture::new(
                mode,
                self.settings.identity_domain.clone(),
                self.settings.saml_callback_path.clone(),
            ))),
        }
    }

    async fn await_capture(
        &self,
        session: &mut Session,
        events: &mut AttemptEvents<'_>,
        strategy: &dyn CredentialCapture,
    ) -> Result<Capture, AuthError> {
        let mut slot = CaptureSlot::default();
        while let Some(event) = events.next().await {
            if let BrowserEvent::NavigationCompleted { url, success } = &event {
                debug!(%url, success, "navigation completed");
                if let Some(host) = url
                    .host_str()
                    .filter(|host| *success && self.settings.is_identity_host(host))
                {
                    session.observe_host(host);
                }
            }
            if slot.feed(strategy, event, session, &self.browser).await? {
                break;
            }
        }
        slot.take().ok_or(AuthError::BrowserClosed)
    }

    fn follow_exchange_pod(&self, session: &mut Session, pod: &str) {
        if session.pod_redirects() >= self.settings.max_pod_redirects {
            warn!(pod, "pod hint after exchange ignored; redirect budget spent");
            return;
        }
        match session.apply_pod_hint(pod) {
            Ok(true) => info!(base_url = %session.base_url(), "exchange moved tenant to another pod"),
            Ok(false) => {}
            Err(err) => warn!(pod, error = %err, "ignoring unusable pod hint"),
        }
    }
}

fn notify(observer: &dyn AuthObserver, line: impl AsRef<str>) {
    let line = line.as_ref();
    info!("{line}");
    observer.log(line);
}

fn no_redirect(observer: &dyn AuthObserver, reason: String) -> AttemptOutcome {
    notify(observer, &reason);
    AttemptOutcome::NoRedirect { reason }
}

fn report_failure(observer: &dyn AuthObserver, attempt: Option<AttemptId>, err: &AuthError) {
    let attempt = attempt.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
    match err.kind() {
        FailureKind::Rejected => {
            info!(attempt = %attempt, error = %err, "authentication rejected");
            if let AuthError::AuthenticationRejected(message) = err {
                observer.log(&format!("Authentication failed: {message}"));
            }
        }
        FailureKind::ResourceApi => {
            warn!(attempt = %attempt, error = %err, "resource API call failed");
            observer.log(&format!("API Error: {err}"));
        }
        FailureKind::Input => {
            warn!(attempt = %attempt, error = %err, "attempt not started");
            observer.log(&format!("Cannot start: {err}"));
        }
        _ => {
            warn!(attempt = %attempt, error = %err, "authentication attempt failed");
            observer.log(&format!("Authentication error: {err}"));
        }
    }
}
