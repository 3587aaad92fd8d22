// Device / cloud HTTP client
//
// Wraps `reqwest::Client` with base-URL construction, the bounded retry
// loop, status classification, and the optional cloud bearer token.
// Every request path is absolute (`/manual`, `/head/1/settings`) and is
// appended verbatim to the base URL.

use std::sync::Arc;

use serde_json::Value;
use strum::{Display, EnumString};
use tracing::{debug, trace, warn};
use url::Url;

use crate::auth::TokenManager;
use crate::error::{Error, preview};
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

/// HTTP verbs understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Parse a verb name, mapping unknown names to [`Error::UnsupportedMethod`].
    pub fn parse(name: &str) -> Result<Self, Error> {
        name.parse()
            .map_err(|_| Error::UnsupportedMethod(name.to_owned()))
    }

    /// Whether the verb can carry a write.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

/// Outcome of a single fetch attempt.
#[derive(Debug)]
pub enum Attempt {
    /// Payload received.
    Ok(Value),
    /// Token renewed after a 401; try again without counting this attempt.
    Retry,
    /// This attempt failed.
    Fail(Error),
}

/// HTTP client bound to one device or to the cloud API.
///
/// Cheap to clone: the connection pool and token manager are shared.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    auth: Option<Arc<TokenManager>>,
}

impl HttpClient {
    /// Create a client for `base_url` (e.g. `http://192.168.1.20`).
    pub fn new(base_url: &str, transport: &TransportConfig, retry: RetryPolicy) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, Url::parse(base_url)?, retry))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url,
            retry,
            auth: None,
        }
    }

    /// Attach a bearer-token manager, turning this into a secure connection.
    pub fn with_auth(mut self, auth: Arc<TokenManager>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Secure connections authenticate with a bearer token and renew on 401.
    pub fn is_secure(&self) -> bool {
        self.auth.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// The underlying HTTP client (for auth flows that need direct access).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        self.auth.as_ref()
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append an absolute endpoint path to the base URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    async fn authorize(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, Error> {
        use secrecy::ExposeSecret;

        match &self.auth {
            Some(auth) => {
                let token = auth.bearer().await?;
                Ok(builder.bearer_auth(token.expose_secret()))
            }
            None => Ok(builder),
        }
    }

    // ── Fetch ────────────────────────────────────────────────────────

    /// One GET attempt against `path`.
    ///
    /// 200 is success, as is 503 on the root `/` endpoint (some firmwares
    /// answer it while busy). A 401 on a secure connection renews the
    /// token when `may_renew` is set and asks the caller to retry.
    pub async fn fetch_once(&self, path: &str, may_renew: bool) -> Attempt {
        match self.try_fetch(path, may_renew).await {
            Ok(Some(value)) => Attempt::Ok(value),
            Ok(None) => Attempt::Retry,
            Err(e) => Attempt::Fail(e),
        }
    }

    async fn try_fetch(&self, path: &str, may_renew: bool) -> Result<Option<Value>, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let builder = self.authorize(self.http.get(url)).await?;
        let resp = builder.send().await?;
        let status = resp.status().as_u16();

        if status == 200 || (status == 503 && path == "/") {
            let body = resp.text().await?;
            return parse_payload(&body, path == "/").map(Some);
        }

        if status == 401 && may_renew {
            if let Some(auth) = &self.auth {
                debug!(path, "bearer token refused, renewing");
                auth.renew().await?;
                return Ok(None);
            }
        }

        Err(Error::Status {
            status,
            path: path.to_owned(),
        })
    }

    /// GET `path` under the retry policy.
    ///
    /// Attempts are sequential. A token renewal triggered by a 401 does not
    /// consume an attempt, but only one renewal is made per call.
    pub async fn fetch(&self, path: &str) -> Result<Value, Error> {
        let mut attempts = 0;
        let mut renewed = false;

        loop {
            match self.fetch_once(path, !renewed).await {
                Attempt::Ok(value) => return Ok(value),
                Attempt::Retry => {
                    renewed = true;
                }
                Attempt::Fail(e) => {
                    attempts += 1;
                    if !self.retry.allows(attempts) {
                        return Err(Error::RetriesExhausted {
                            path: path.to_owned(),
                            attempts,
                            last: Box::new(e),
                        });
                    }
                    warn!(path, attempt = attempts, error = %e, "fetch failed, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }

    /// GET used for capability checks: `Ok(true)` on 200, `Ok(false)` on
    /// any other answer.
    ///
    /// 5xx answers and transport errors are retried under the policy. A
    /// server that keeps failing counts as "absent"; an unreachable one is
    /// returned as [`Error::RetriesExhausted`].
    pub async fn probe(&self, path: &str) -> Result<bool, Error> {
        let url = self.url(path)?;
        let mut attempts = 0;

        loop {
            debug!("capability GET {url}");
            let err = match self.status_of(url.clone()).await {
                Ok(200) => return Ok(true),
                Ok(status) if status < 500 => return Ok(false),
                Ok(status) => Error::Status {
                    status,
                    path: path.to_owned(),
                },
                Err(e) => e,
            };

            attempts += 1;
            if !self.retry.allows(attempts) {
                return match err {
                    Error::Status { .. } => Ok(false),
                    last => Err(Error::RetriesExhausted {
                        path: path.to_owned(),
                        attempts,
                        last: Box::new(last),
                    }),
                };
            }
            warn!(path, attempt = attempts, error = %err, "capability check failed, retrying");
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    async fn status_of(&self, url: Url) -> Result<u16, Error> {
        let builder = self.authorize(self.http.get(url)).await?;
        Ok(builder.send().await?.status().as_u16())
    }

    // ── Push ─────────────────────────────────────────────────────────

    /// Send a write to `path`.
    ///
    /// 200/201/202 are success; the body is returned when it is JSON.
    /// 400 and 404 fail immediately. Everything else is retried under the
    /// same policy as fetch. Non-write verbs fail without a network call.
    pub async fn send(&self, path: &str, method: Method, payload: Option<&Value>) -> Result<Option<Value>, Error> {
        if !method.is_write() {
            return Err(Error::UnsupportedMethod(method.to_string()));
        }

        let mut attempts = 0;
        let mut renewed = false;

        loop {
            let err = match self.send_once(path, method, payload).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if err.is_terminal() {
                return Err(err);
            }

            if err.status() == Some(401) && !renewed {
                if let Some(auth) = &self.auth {
                    renewed = true;
                    auth.renew().await?;
                    continue;
                }
            }

            attempts += 1;
            if !self.retry.allows(attempts) {
                return Err(Error::RetriesExhausted {
                    path: path.to_owned(),
                    attempts,
                    last: Box::new(err),
                });
            }
            warn!(path, %method, attempt = attempts, error = %err, "push failed, retrying");
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    async fn send_once(&self, path: &str, method: Method, payload: Option<&Value>) -> Result<Option<Value>, Error> {
        let url = self.url(path)?;
        debug!("{method} {url}");

        let builder = match method {
            Method::Post => self.http.post(url),
            Method::Put => self.http.put(url),
            Method::Patch => self.http.patch(url),
            Method::Delete => self.http.delete(url),
            Method::Get => return Err(Error::UnsupportedMethod(method.to_string())),
        };
        let builder = match (method, payload) {
            (Method::Delete, _) | (_, None) => builder,
            (_, Some(body)) => builder.json(body),
        };

        let resp = self.authorize(builder).await?.send().await?;
        let status = resp.status().as_u16();

        if matches!(status, 200..=202) {
            let body = resp.text().await?;
            trace!(path, body = %preview(&body), "write accepted");
            return Ok(serde_json::from_str(&body).ok());
        }

        Err(Error::Status {
            status,
            path: path.to_owned(),
        })
    }
}

/// Parse a fetched body. The root endpoint may answer with non-JSON
/// text; it is kept as a string so the source still holds a payload.
fn parse_payload(body: &str, lenient: bool) -> Result<Value, Error> {
    match serde_json::from_str(body) {
        Ok(v) => Ok(v),
        Err(_) if lenient => Ok(Value::String(body.to_owned())),
        Err(e) => Err(Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(body)),
            body: body.to_owned(),
        }),
    }
}
