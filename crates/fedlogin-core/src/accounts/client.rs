use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::auth::{AuthError, CookieJar};
use crate::config::AuthSettings;

const USER_AGENT: &str = "fedlogin/0.1.0";

/// Privileged account as listed by the resource API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "UserName", alias = "username")]
    pub user_name: String,
    #[serde(default, alias = "Address")]
    pub address: String,
    #[serde(default, alias = "PlatformID", alias = "platformID")]
    pub platform_id: String,
}

#[derive(Debug, Deserialize)]
struct AccountsEnvelope {
    #[serde(default)]
    value: Vec<Account>,
}

/// Client for the downstream accounts endpoint.
#[derive(Debug, Clone)]
pub struct AccountsClient {
    http: Client,
    settings: AuthSettings,
}

impl AccountsClient {
    pub fn new(settings: &AuthSettings) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            http,
            settings: settings.clone(),
        })
    }

    /// `https://{subdomain}.{resource_domain}{accounts_path}?limit={n}`.
    pub fn accounts_url(&self, subdomain: &str) -> Result<Url, AuthError> {
        if subdomain.trim().is_empty() {
            return Err(AuthError::InvalidInput("resource subdomain is empty"));
        }
        let mut url = self
            .settings
            .resource_base(subdomain.trim())?
            .join(&self.settings.accounts_path)?;
        url.query_pairs_mut()
            .clear()
            .append_pair("limit", &self.settings.accounts_limit.to_string());
        Ok(url)
    }

    /// List accounts with `bearer`, forwarding any jar cookies that apply.
    pub async fn list_accounts(
        &self,
        subdomain: &str,
        bearer: &str,
        cookies: Option<&CookieJar>,
    ) -> Result<Vec<Account>, AuthError> {
        let url = self.accounts_url(subdomain)?;
        debug!(%url, "fetching accounts");

        let mut request = self
            .http
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {bearer}"));
        if let Some(header) = cookies.and_then(|jar| jar.header_for(&url)) {
            request = request.header(COOKIE, header);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::resource_api(status, &text));
        }

        let envelope: AccountsEnvelope =
            serde_json::from_str(&text).map_err(|err| AuthError::Protocol {
                endpoint: "Accounts",
                message: err.to_string(),
                body: text,
            })?;
        Ok(envelope.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Cookie;
    use crate::config::DEFAULT_ACCOUNTS_PATH;
    use httpmock::prelude::*;
    use reqwest::StatusCode;

    fn client_for(server: &MockServer) -> AccountsClient {
        let settings = AuthSettings {
            resource_origin: Some(Url::parse(&server.base_url()).unwrap()),
            ..AuthSettings::default()
        };
        AccountsClient::new(&settings).unwrap()
    }

    #[test]
    fn url_uses_subdomain_and_limit() {
        let client = AccountsClient::new(&AuthSettings::default()).unwrap();
        let url = client.accounts_url("ABC1234").unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc1234.privilegecloud.cyberark.cloud/PasswordVault/API/Accounts?limit=10"
        );
        assert!(client.accounts_url(" ").is_err());
    }

    #[tokio::test]
    async fn lists_accounts_in_order() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(DEFAULT_ACCOUNTS_PATH)
                .query_param("limit", "10")
                .header("authorization", "Bearer T1");
            then.status(200).json_body(serde_json::json!({
                "value": [
                    { "name": "db-admin", "userName": "sa", "address": "db.acme.test", "platformId": "MSSql" },
                    { "Name": "root", "UserName": "root", "Address": "10.0.0.5", "PlatformID": "UnixSSH" }
                ],
                "count": 2
            }));
        });

        let accounts = client_for(&server)
            .list_accounts("acme", "T1", None)
            .await
            .unwrap();
        mock.assert();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "db-admin");
        assert_eq!(accounts[0].platform_id, "MSSql");
        assert_eq!(accounts[1].user_name, "root");
        assert_eq!(accounts[1].platform_id, "UnixSSH");
    }

    #[tokio::test]
    async fn forwards_matching_cookies() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(DEFAULT_ACCOUNTS_PATH)
                .header("cookie", "session=s1");
            then.status(200).json_body(serde_json::json!({ "value": [] }));
        });

        let mut jar = CookieJar::default();
        jar.merge([
            Cookie::new("session", "s1", "127.0.0.1", "/"),
            Cookie::new("idp", "x", "acme.id.example.test", "/"),
        ]);
        let accounts = client_for(&server)
            .list_accounts("acme", "T1", Some(&jar))
            .await
            .unwrap();
        mock.assert();
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn error_status_carries_truncated_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(DEFAULT_ACCOUNTS_PATH);
            then.status(401).body("u".repeat(1_000));
        });

        let err = client_for(&server)
            .list_accounts("acme", "bad", None)
            .await
            .unwrap_err();
        match err {
            AuthError::ResourceApi { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body.len(), 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
