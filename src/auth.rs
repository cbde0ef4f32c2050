use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

/// Opaque bearer token. Passed by value into every outbound call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Anything that can hand out a currently valid bearer token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<Credential>;
}

/// A fixed token, for scripts and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(Credential);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Credential::new(token))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    access_token: String,
    /// Only present when the tenant rotates refresh tokens.
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    credential: Credential,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Silent token renewal against an Auth0 tenant using a refresh token.
#[derive(Clone)]
pub struct Auth0TokenSource {
    client: Client,
    token_url: String,
    client_id: String,
    audience: Option<String>,
    refresh_token: Arc<Mutex<String>>,
    cached_token: Arc<Mutex<Option<CachedToken>>>,
}

impl Auth0TokenSource {
    pub fn new(domain: &str, client_id: String, refresh_token: String) -> Self {
        let domain = domain.trim_end_matches('/');
        let token_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            format!("{}/oauth/token", domain)
        } else {
            format!("https://{}/oauth/token", domain)
        };
        Self {
            client: Client::new(),
            token_url,
            client_id,
            audience: None,
            refresh_token: Arc::new(Mutex::new(refresh_token)),
            cached_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Build from `AUTH0_DOMAIN`, `AUTH0_CLIENT_ID`, `AUTH0_REFRESH_TOKEN` and
    /// the optional `AUTH0_AUDIENCE`.
    pub fn from_env() -> Result<Self> {
        let var = |key: &str| std::env::var(key).map_err(|_| anyhow!("{} is not set", key));
        let source = Self::new(
            &var("AUTH0_DOMAIN")?,
            var("AUTH0_CLIENT_ID")?,
            var("AUTH0_REFRESH_TOKEN")?,
        );
        Ok(match std::env::var("AUTH0_AUDIENCE") {
            Ok(audience) => source.with_audience(audience),
            Err(_) => source,
        })
    }

    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = Some(audience);
        self
    }

    async fn refresh_access_token(&self) -> Result<Credential> {
        let refresh_token = self.refresh_token.lock().await.clone();

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        if let Some(ref audience) = self.audience {
            form.push(("audience", audience.as_str()));
        }

        let resp = self.client.post(&self.token_url).form(&form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to refresh token: {} - {}", status, body));
        }

        let token_resp: RefreshTokenResponse = resp.json().await?;

        let expires_in = token_resp.expires_in.unwrap_or(3600);
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(expires_in);

        if let Some(rotated) = token_resp.refresh_token {
            *self.refresh_token.lock().await = rotated;
        }

        let credential = Credential::new(token_resp.access_token);
        *self.cached_token.lock().await = Some(CachedToken {
            credential: credential.clone(),
            expires_at,
        });
        tracing::debug!("Refreshed access token, valid until {}", expires_at);

        Ok(credential)
    }
}

#[async_trait]
impl TokenSource for Auth0TokenSource {
    async fn access_token(&self) -> Result<Credential> {
        // Reuse the cached token while it has more than 60s left
        {
            let cached = self.cached_token.lock().await;
            if let Some(ref token) = *cached {
                if token.expires_at > chrono::Utc::now() + chrono::Duration::seconds(60) {
                    return Ok(token.credential.clone());
                }
            }
        }

        self.refresh_access_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
        assert_eq!(credential.as_str(), "secret-token");
    }

    #[test]
    fn bare_domain_gets_https_token_url() {
        let source = Auth0TokenSource::new("tenant.auth0.com/", "id".into(), "rt".into());
        assert_eq!(source.token_url, "https://tenant.auth0.com/oauth/token");

        let local = Auth0TokenSource::new("http://127.0.0.1:9000", "id".into(), "rt".into());
        assert_eq!(local.token_url, "http://127.0.0.1:9000/oauth/token");
    }

    #[tokio::test]
    async fn static_token_always_returns_same_credential() {
        let source = StaticToken::new("abc");
        assert_eq!(source.access_token().await.unwrap().as_str(), "abc");
        assert_eq!(source.access_token().await.unwrap().as_str(), "abc");
    }
}
