mod browser;
mod capture;
mod challenge;
mod claims;
mod error;
mod flow;
pub mod identity;
mod observer;
mod orchestrator;
mod pod;
mod session;

pub use browser::{
    event_channel, AttemptEvents, Browser, BrowserEvent, BrowserEventSender, BrowserEvents,
    InterceptedRequest, PendingRequest, SyntheticResponse, FORM_CONTENT_TYPE,
};
pub use capture::{
    authorization_code, saml_response, Capture, CaptureSlot, CapturedCredential,
    CookieScanCapture, CredentialCapture, InterceptionCapture,
};
pub use challenge::{resolve_challenge, ChallengeOutcome};
pub use claims::TokenClaims;
pub use error::{AuthError, FailureKind};
pub use flow::{AuthMode, CaptureStrategy, InvalidChoice};
pub use identity::IdentityClient;
pub use observer::AuthObserver;
pub use orchestrator::{AttemptOutcome, AuthManager, AuthenticatedSession, TokenSource};
pub use pod::resolve_pod;
pub use session::{AttemptId, Cookie, CookieJar, LoginRequest, Session};
