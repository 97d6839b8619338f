use tracing::{debug, info, warn};

use super::identity::{IdentityClient, StartAuthenticationResponse};
use super::{AuthError, Session};

/// Call `StartAuthentication` until the identity service stops routing the
/// tenant to another pod.
///
/// At most `max_redirects` calls are made (at least one). Each call whose
/// `PodFqdn` differs from the current authority rewrites the session's base
/// URL and triggers another call; running out of calls is
/// [`AuthError::RedirectLoopExceeded`]. A hint that is not a usable host is
/// logged and ignored, settling on the current response.
pub async fn resolve_pod(
    client: &IdentityClient,
    session: &mut Session,
    max_redirects: u32,
) -> Result<StartAuthenticationResponse, AuthError> {
    let bound = max_redirects.max(1);
    for call in 1..=bound {
        let response = client
            .start_authentication(session.base_url(), session.user())
            .await?;
        let hint = response.result.pod_fqdn.as_deref().unwrap_or_default();
        let moved = match session.apply_pod_hint(hint) {
            Ok(moved) => moved,
            Err(err) => {
                warn!(
                    attempt = %session.attempt(),
                    hint,
                    error = %err,
                    "ignoring unusable pod hint"
                );
                false
            }
        };
        if !moved {
            debug!(attempt = %session.attempt(), call, "tenant routing settled");
            return Ok(response);
        }
        info!(
            attempt = %session.attempt(),
            call,
            base_url = %session.base_url(),
            "tenant routed to another pod"
        );
    }
    Err(AuthError::RedirectLoopExceeded { attempts: bound })
}
