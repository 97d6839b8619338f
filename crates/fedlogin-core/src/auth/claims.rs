use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Unverified view of a JWT bearer's payload, for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: Option<String>,
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    unique_name: Option<String>,
    email: Option<String>,
    exp: Option<i64>,
}

impl TokenClaims {
    /// Decode the payload segment of `token`. Returns `None` for opaque tokens.
    pub fn peek(token: &str) -> Option<Self> {
        let mut segments = token.split('.');
        let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let raw: RawClaims = serde_json::from_slice(&bytes).ok()?;
        Some(Self {
            subject: raw.sub,
            name: raw.unique_name.or(raw.email),
            expires_at: raw
                .exp
                .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0)),
        })
    }

    /// Best label for "logged in as".
    pub fn identity(&self) -> Option<&str> {
        self.name.as_deref().or(self.subject.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn peeks_subject_and_expiry() {
        let token = jwt(r#"{"sub":"u-1","unique_name":"ada@acme.test","exp":1700000000}"#);
        let claims = TokenClaims::peek(&token).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("u-1"));
        assert_eq!(claims.identity(), Some("ada@acme.test"));
        assert_eq!(claims.expires_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn opaque_tokens_yield_none() {
        assert!(TokenClaims::peek("T1").is_none());
        assert!(TokenClaims::peek("a.!!!.c").is_none());
    }
}
