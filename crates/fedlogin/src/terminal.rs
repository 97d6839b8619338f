use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fedlogin_core::auth::{
    authorization_code, AttemptId, AuthError, AuthMode, Browser, BrowserEvent,
    BrowserEventSender, CaptureStrategy, Cookie, InterceptedRequest,
};
use fedlogin_core::config::{host_in_domain, AuthSettings};
use tokio::task;
use tracing::{debug, warn};
use url::Url;

/// Browser stand-in for a plain terminal.
///
/// Navigation opens the system browser and asks the user to paste back what the
/// identity provider ended on: the final redirect URL, the SAML callback form
/// body, or the `idToken-*` cookie. The paste is replayed as browser events.
pub struct TerminalBrowser {
    sender: BrowserEventSender,
    context: PasteContext,
    interception: bool,
    open_browser: bool,
    cookies: Arc<Mutex<Vec<Cookie>>>,
}

/// Where pasted material is replayed.
#[derive(Debug, Clone)]
pub struct PasteContext {
    pub mode: AuthMode,
    /// Identity page the user returns to; cookie pastes land here.
    pub landing: Url,
    /// URL the identity provider posts the SAML form to.
    pub saml_callback: Url,
    pub identity_domain: String,
}

impl PasteContext {
    pub fn new(settings: &AuthSettings, mode: AuthMode, landing: Url) -> Result<Self, AuthError> {
        let saml_callback = landing.join(&settings.saml_callback_path)?;
        Ok(Self {
            mode,
            landing,
            saml_callback,
            identity_domain: settings.identity_domain.clone(),
        })
    }

    /// Check that `pasted` is something the active capture strategy can use.
    pub fn accepts(&self, pasted: &Pasted, interception: bool) -> Result<(), String> {
        match (pasted, interception, self.mode) {
            (Pasted::Redirect(url), true, AuthMode::Oidc) => {
                let on_identity_host = url
                    .host_str()
                    .is_some_and(|host| host_in_domain(host, &self.identity_domain));
                if !on_identity_host {
                    Err(format!("that URL is not on {}", self.identity_domain))
                } else if authorization_code(url).is_none() {
                    Err("that URL carries no code= parameter".into())
                } else {
                    Ok(())
                }
            }
            (Pasted::SamlForm(_), true, AuthMode::Saml) => Ok(()),
            (Pasted::IdTokenCookie { .. }, false, _) => Ok(()),
            (_, true, AuthMode::Oidc) => Err("expected the final redirect URL".into()),
            (_, true, AuthMode::Saml) => Err("expected the SAMLResponse form body".into()),
            (_, false, _) => Err("expected the idToken cookie".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pasted {
    Redirect(Url),
    SamlForm(String),
    IdTokenCookie { name: String, value: String },
}

impl TerminalBrowser {
    pub fn new(
        sender: BrowserEventSender,
        settings: &AuthSettings,
        context: PasteContext,
        open_browser: bool,
    ) -> Self {
        Self {
            sender,
            context,
            interception: settings.capture != CaptureStrategy::CookieScan,
            open_browser,
            cookies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn prompt(&self) -> &'static str {
        match (self.interception, self.context.mode) {
            (true, AuthMode::Oidc) => "Paste the final redirect URL (it contains code=): ",
            (true, AuthMode::Saml) => "Paste the SAMLResponse form body from the callback: ",
            (false, _) => "Paste the idToken cookie (name=value): ",
        }
    }
}

#[async_trait]
impl Browser for TerminalBrowser {
    async fn navigate(&self, attempt: AttemptId, url: &Url) -> Result<(), AuthError> {
        eprintln!("\nComplete sign-in in your browser:\n  {url}\n");
        if self.open_browser {
            if let Err(err) = open::that(url.as_str()) {
                warn!(error = %err, "failed to launch browser; open the URL manually");
            }
        }

        let prompt = self.prompt();
        let interception = self.interception;
        let sender = self.sender.clone();
        let context = self.context.clone();
        let cookies = Arc::clone(&self.cookies);
        tokio::spawn(async move {
            while sender.is_current(attempt) {
                let line = match read_line(prompt).await {
                    Ok(Some(line)) => line,
                    Ok(None) => return,
                    Err(err) => {
                        warn!(error = %err, "unable to read pasted input");
                        return;
                    }
                };
                if !sender.is_current(attempt) {
                    return;
                }
                let parsed = parse_pasted_input(&line)
                    .and_then(|pasted| context.accepts(&pasted, interception).map(|()| pasted));
                match parsed {
                    Ok(pasted) => {
                        for event in replay(pasted, &context, &cookies) {
                            if !sender.send(attempt, event) {
                                return;
                            }
                        }
                        return;
                    }
                    Err(reason) => eprintln!("{reason}; try again."),
                }
            }
        });
        Ok(())
    }

    fn supports_interception(&self) -> bool {
        self.interception
    }

    async fn enable_interception(&self, filter: &str) -> Result<(), AuthError> {
        debug!(filter, "interception is emulated by pasted input");
        Ok(())
    }

    async fn cookies(&self, url: &Url) -> Result<Vec<Cookie>, AuthError> {
        let cookies = self
            .cookies
            .lock()
            .map_err(|_| AuthError::Browser("cookie store poisoned".into()))?;
        Ok(cookies
            .iter()
            .filter(|cookie| cookie.applies_to(url))
            .cloned()
            .collect())
    }
}

/// Classify what the user pasted.
pub fn parse_pasted_input(input: &str) -> Result<Pasted, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("nothing pasted".into());
    }

    if let Ok(url) = Url::parse(input) {
        if matches!(url.scheme(), "http" | "https") {
            return Ok(Pasted::Redirect(url));
        }
    }

    if input.contains("SAMLResponse=") {
        return Ok(Pasted::SamlForm(input.to_owned()));
    }

    let pair = input
        .trim_start_matches("Cookie:")
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| {
            name.trim().to_ascii_lowercase().starts_with("idtoken-") && !value.trim().is_empty()
        });
    if let Some((name, value)) = pair {
        return Ok(Pasted::IdTokenCookie {
            name: name.trim().to_owned(),
            value: value.trim().to_owned(),
        });
    }

    Err("expected a redirect URL, a SAMLResponse form body or an idToken cookie".into())
}

/// Browser events equivalent to the pasted material.
fn replay(pasted: Pasted, context: &PasteContext, cookies: &Mutex<Vec<Cookie>>) -> Vec<BrowserEvent> {
    match pasted {
        Pasted::Redirect(url) => {
            let (request, _reply) = BrowserEvent::resource(InterceptedRequest::get(url.clone()));
            vec![request, BrowserEvent::navigation(url, true)]
        }
        Pasted::SamlForm(body) => {
            let callback = context.saml_callback.clone();
            let (request, _reply) =
                BrowserEvent::resource(InterceptedRequest::post_form(callback.clone(), body));
            vec![request, BrowserEvent::navigation(callback, true)]
        }
        Pasted::IdTokenCookie { name, value } => {
            let host = context.landing.host_str().unwrap_or_default();
            if let Ok(mut jar) = cookies.lock() {
                jar.retain(|cookie| cookie.name != name);
                jar.push(Cookie::new(name, value, host, "/"));
            }
            vec![BrowserEvent::navigation(context.landing.clone(), true)]
        }
    }
}

async fn read_line(prompt: &'static str) -> io::Result<Option<String>> {
    task::spawn_blocking(move || {
        eprint!("{prompt}");
        io::stderr().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_owned()))
    })
    .await
    .map_err(io::Error::other)?
}
