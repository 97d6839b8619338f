use super::identity::StartAuthenticationResult;

/// What a settled `StartAuthentication` result tells us to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Send the browser to the identity provider.
    Redirect(String),
    /// The first mechanism wants interactive input (OTP, password...), which
    /// this flow does not handle.
    InteractiveOnly {
        mechanism: Option<String>,
        prompt: String,
    },
    /// Neither a redirect URL nor any challenge was offered.
    NotFederated,
}

impl ChallengeOutcome {
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            ChallengeOutcome::Redirect(url) => Some(url),
            _ => None,
        }
    }

    /// Human-readable reason for not redirecting.
    pub fn describe(&self) -> String {
        match self {
            ChallengeOutcome::Redirect(url) => format!("redirect to {url}"),
            ChallengeOutcome::InteractiveOnly { mechanism, prompt } => format!(
                "no redirect: mechanism {} requires interactive input not supported by this flow ({prompt})",
                mechanism.as_deref().unwrap_or("(unnamed)")
            ),
            ChallengeOutcome::NotFederated => "no redirect URL found in response".into(),
        }
    }
}

/// Pick the identity-provider redirect.
///
/// `IdpRedirectUrl` wins; otherwise the first mechanism of the first challenge
/// is used when its prompt is a URL.
pub fn resolve_challenge(result: &StartAuthenticationResult) -> ChallengeOutcome {
    if let Some(url) = result
        .idp_redirect_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    {
        return ChallengeOutcome::Redirect(url.to_owned());
    }

    let mechanism = result
        .challenges
        .first()
        .and_then(|challenge| challenge.mechanisms.first());
    let prompt = mechanism
        .and_then(|mechanism| mechanism.prompt.as_deref())
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty());

    match prompt {
        Some(prompt) if looks_like_url(prompt) => ChallengeOutcome::Redirect(prompt.to_owned()),
        Some(prompt) => ChallengeOutcome::InteractiveOnly {
            mechanism: mechanism.and_then(|mechanism| mechanism.name.clone()),
            prompt: prompt.to_owned(),
        },
        None => ChallengeOutcome::NotFederated,
    }
}

fn looks_like_url(value: &str) -> bool {
    value
        .get(..4)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::{Challenge, Mechanism};

    fn with_prompt(prompt: &str) -> StartAuthenticationResult {
        StartAuthenticationResult {
            challenges: vec![Challenge {
                mechanisms: vec![Mechanism {
                    prompt: Some(prompt.into()),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn redirect_url_takes_precedence_over_prompt() {
        let mut result = with_prompt("https://b");
        result.idp_redirect_url = Some("https://a".into());
        assert_eq!(
            resolve_challenge(&result),
            ChallengeOutcome::Redirect("https://a".into())
        );
    }

    #[test]
    fn url_prompt_is_used_when_no_redirect_url() {
        let mut result = with_prompt("https://idp.test/saml?SAMLRequest=abc");
        result.idp_redirect_url = Some("   ".into());
        assert_eq!(
            resolve_challenge(&result).redirect_url(),
            Some("https://idp.test/saml?SAMLRequest=abc")
        );
    }

    #[test]
    fn non_url_prompt_yields_no_redirect() {
        let outcome = resolve_challenge(&with_prompt("Enter the code sent to your device"));
        assert!(outcome.redirect_url().is_none());
        assert!(matches!(outcome, ChallengeOutcome::InteractiveOnly { .. }));
        assert!(outcome.describe().contains("interactive input"));
    }

    #[test]
    fn interactive_outcome_names_the_mechanism() {
        let mut result = with_prompt("Enter your password");
        result.challenges[0].mechanisms[0].name = Some("UP".into());
        let outcome = resolve_challenge(&result);
        assert_eq!(
            outcome,
            ChallengeOutcome::InteractiveOnly {
                mechanism: Some("UP".into()),
                prompt: "Enter your password".into(),
            }
        );
        assert!(outcome.describe().contains("mechanism UP"));
    }

    #[test]
    fn empty_result_is_not_federated() {
        let outcome = resolve_challenge(&StartAuthenticationResult::default());
        assert_eq!(outcome, ChallengeOutcome::NotFederated);
    }

    #[test]
    fn only_first_mechanism_is_considered() {
        let result = StartAuthenticationResult {
            challenges: vec![Challenge {
                mechanisms: vec![
                    Mechanism {
                        prompt: Some("Password".into()),
                        ..Default::default()
                    },
                    Mechanism {
                        prompt: Some("https://idp.test".into()),
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        assert!(resolve_challenge(&result).redirect_url().is_none());
    }
}
