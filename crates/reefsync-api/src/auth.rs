// Cloud bearer-token cycle
//
// Password grant against `/oauth/token` with fixed client credentials.
// Tokens are reused until the renewal window elapses, then fetched again.
// A 401 seen by the HTTP client forces an early renewal.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, preview};

/// How long a bearer token is trusted before it is renewed.
pub const TOKEN_RENEWAL_WINDOW: Duration = Duration::from_secs(45 * 60);

/// Account and OAuth client credentials for the cloud.
#[derive(Debug, Clone)]
pub struct CloudCredentials {
    pub username: String,
    pub password: SecretString,
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct Token {
    access: SecretString,
    issued: Instant,
}

/// Owns the current bearer token and renews it on demand.
pub struct TokenManager {
    http: reqwest::Client,
    token_url: Url,
    credentials: CloudCredentials,
    window: Duration,
    current: Mutex<Option<Token>>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, base_url: &Url, credentials: CloudCredentials) -> Result<Self, Error> {
        Ok(Self {
            http,
            token_url: base_url.join("/oauth/token")?,
            credentials,
            window: TOKEN_RENEWAL_WINDOW,
            current: Mutex::new(None),
        })
    }

    /// Override the renewal window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// The account this manager authenticates.
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Current bearer token, renewing it first when missing or stale.
    pub async fn bearer(&self) -> Result<SecretString, Error> {
        let mut guard = self.current.lock().await;
        let fresh = guard
            .as_ref()
            .is_some_and(|t| t.issued.elapsed() < self.window);
        if !fresh {
            *guard = Some(self.request_token().await?);
        }
        guard
            .as_ref()
            .map(|t| t.access.clone())
            .ok_or_else(|| Error::Authentication {
                message: "no bearer token".into(),
            })
    }

    /// Drop the current token and fetch a new one.
    pub async fn renew(&self) -> Result<(), Error> {
        let token = self.request_token().await?;
        *self.current.lock().await = Some(token);
        Ok(())
    }

    async fn request_token(&self) -> Result<Token, Error> {
        debug!(url = %self.token_url, "requesting bearer token");

        let form = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.expose_secret()),
        ];

        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose_secret()),
            )
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("token request failed (HTTP {status}): {}", preview(&body)),
            });
        }

        let body = resp.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("token response: {e}"),
            body: body.clone(),
        })?;

        info!(user = %self.credentials.username, "cloud token renewed");
        Ok(Token {
            access: SecretString::from(parsed.access_token),
            issued: Instant::now(),
        })
    }
}
