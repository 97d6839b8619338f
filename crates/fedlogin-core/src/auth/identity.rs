use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{AuthError, CapturedCredential};

pub const START_AUTHENTICATION_PATH: &str = "/Security/StartAuthentication";
pub const ADVANCE_AUTHENTICATION_PATH: &str = "/Security/AdvanceAuthentication";
pub const PROTOCOL_VERSION: &str = "1.0";

const USER_AGENT: &str = "fedlogin/0.1.0";

/// Response to `StartAuthentication`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAuthenticationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "Result", default)]
    pub result: StartAuthenticationResult,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartAuthenticationResult {
    #[serde(default)]
    pub pod_fqdn: Option<String>,
    #[serde(default)]
    pub idp_redirect_url: Option<String>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Challenge {
    #[serde(default)]
    pub mechanisms: Vec<Mechanism>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mechanism {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Response to `AdvanceAuthentication`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvanceAuthenticationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "Result", default)]
    pub result: Option<AdvanceAuthenticationResult>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdvanceAuthenticationResult {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub pod_fqdn: Option<String>,
}

/// Token issued by a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedToken {
    pub token: String,
    pub pod_fqdn: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartAuthenticationRequest<'a> {
    user: &'a str,
    version: &'a str,
}

/// HTTP client for the identity service's `/Security` endpoints.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: Client,
}

impl IdentityClient {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Issue `StartAuthentication` for `user` against `base_url`.
    pub async fn start_authentication(
        &self,
        base_url: &Url,
        user: &str,
    ) -> Result<StartAuthenticationResponse, AuthError> {
        if user.trim().is_empty() {
            return Err(AuthError::InvalidInput("user identifier is empty"));
        }
        let url = endpoint(base_url, START_AUTHENTICATION_PATH)?;
        debug!(%url, "posting StartAuthentication");
        let body = StartAuthenticationRequest {
            user: user.trim(),
            version: PROTOCOL_VERSION,
        };
        self.post_json("StartAuthentication", url, &body).await
    }

    /// Trade a captured credential for a session token.
    ///
    /// A `success: false` reply becomes [`AuthError::AuthenticationRejected`].
    pub async fn advance_authentication(
        &self,
        base_url: &Url,
        credential: &CapturedCredential,
    ) -> Result<ExchangedToken, AuthError> {
        let url = endpoint(base_url, ADVANCE_AUTHENTICATION_PATH)?;
        debug!(%url, field = credential.exchange_field(), "posting AdvanceAuthentication");
        let mut body = serde_json::Map::new();
        body.insert(
            credential.exchange_field().to_owned(),
            serde_json::Value::String(credential.value().to_owned()),
        );
        let response: AdvanceAuthenticationResponse = self
            .post_json("AdvanceAuthentication", url, &body)
            .await?;

        if !response.success {
            let message = response
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "authentication failed".into());
            return Err(AuthError::AuthenticationRejected(message));
        }

        let result = response.result.unwrap_or_default();
        match result.token.filter(|token| !token.is_empty()) {
            Some(token) => Ok(ExchangedToken {
                token,
                pod_fqdn: result.pod_fqdn.filter(|pod| !pod.trim().is_empty()),
            }),
            None => Err(AuthError::Protocol {
                endpoint: "AdvanceAuthentication",
                message: "successful response carried no token".into(),
                body: String::new(),
            }),
        }
    }

    async fn post_json<B, R>(&self, endpoint: &'static str, url: Url, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::UnexpectedStatus {
                endpoint,
                status,
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|err| AuthError::Protocol {
            endpoint,
            message: err.to_string(),
            body: text,
        })
    }
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, AuthError> {
    if !base_url.has_host() {
        return Err(AuthError::InvalidInput("identity base URL has no host"));
    }
    Ok(base_url.join(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use reqwest::StatusCode;

    fn client() -> IdentityClient {
        IdentityClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn start_authentication_posts_user_and_version() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(START_AUTHENTICATION_PATH)
                .json_body(serde_json::json!({ "User": "ada@acme.test", "Version": "1.0" }));
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "Result": {
                    "IdpRedirectUrl": "https://login.idp.test/authorize?x=1",
                    "Challenges": [
                        { "Mechanisms": [ { "Name": "OTP", "Prompt": "Enter the code" } ] }
                    ]
                }
            }));
        });

        let base = Url::parse(&server.base_url()).unwrap();
        let response = client()
            .start_authentication(&base, "ada@acme.test")
            .await
            .unwrap();
        mock.assert();
        assert!(response.success);
        assert_eq!(
            response.result.idp_redirect_url.as_deref(),
            Some("https://login.idp.test/authorize?x=1")
        );
        assert_eq!(
            response.result.challenges[0].mechanisms[0].prompt.as_deref(),
            Some("Enter the code")
        );
        assert!(response.result.pod_fqdn.is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_a_protocol_error_with_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(START_AUTHENTICATION_PATH);
            then.status(200).body("<html>maintenance</html>");
        });

        let base = Url::parse(&server.base_url()).unwrap();
        let err = client()
            .start_authentication(&base, "ada")
            .await
            .unwrap_err();
        match err {
            AuthError::Protocol { endpoint, body, .. } => {
                assert_eq!(endpoint, "StartAuthentication");
                assert_eq!(body, "<html>maintenance</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(START_AUTHENTICATION_PATH);
            then.status(503).body("busy");
        });

        let base = Url::parse(&server.base_url()).unwrap();
        let err = client()
            .start_authentication(&base, "ada")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::auth::FailureKind::Transport);
        match err {
            AuthError::UnexpectedStatus { status, .. } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_user_is_rejected_before_sending() {
        let base = Url::parse("https://acme.id.example.test").unwrap();
        let err = client().start_authentication(&base, " ").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn exchange_sends_code_and_returns_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(ADVANCE_AUTHENTICATION_PATH)
                .json_body(serde_json::json!({ "Code": "ABC 123" }));
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "Result": { "Token": "T1", "PodFqdn": "pod9.id.example.test" }
            }));
        });

        let base = Url::parse(&server.base_url()).unwrap();
        let token = client()
            .advance_authentication(
                &base,
                &CapturedCredential::AuthorizationCode("ABC 123".into()),
            )
            .await
            .unwrap();
        mock.assert();
        assert_eq!(token.token, "T1");
        assert_eq!(token.pod_fqdn.as_deref(), Some("pod9.id.example.test"));
    }

    #[tokio::test]
    async fn exchange_sends_saml_response_field() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(ADVANCE_AUTHENTICATION_PATH)
                .json_body(serde_json::json!({ "SAMLResponse": "PHNhbWw+" }));
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "Result": { "Token": "S1" }
            }));
        });

        let base = Url::parse(&server.base_url()).unwrap();
        let token = client()
            .advance_authentication(&base, &CapturedCredential::SamlAssertion("PHNhbWw+".into()))
            .await
            .unwrap();
        mock.assert();
        assert_eq!(token.token, "S1");
        assert!(token.pod_fqdn.is_none());
    }

    #[tokio::test]
    async fn exchange_rejection_carries_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path(ADVANCE_AUTHENTICATION_PATH);
            then.status(200)
                .json_body(serde_json::json!({ "success": false, "Message": "Invalid code" }));
        });

        let base = Url::parse(&server.base_url()).unwrap();
        let err = client()
            .advance_authentication(&base, &CapturedCredential::AuthorizationCode("bad".into()))
            .await
            .unwrap_err();
        match err {
            AuthError::AuthenticationRejected(message) => assert_eq!(message, "Invalid code"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
