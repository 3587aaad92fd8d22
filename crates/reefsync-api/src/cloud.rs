// Cloud API endpoints
//
// Thin typed layer over `HttpClient` for the wave library and per-device
// wave schedules. Account-level collections (`/user`, `/aquarium`,
// `/device`, libraries) are polled as ordinary sources by the core crate.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::{CloudCredentials, TokenManager};
use crate::client::{HttpClient, Method};
use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

/// Default cloud host.
pub const DEFAULT_CLOUD_HOST: &str = "cloud.reef-beat.com";

pub const USER_PATH: &str = "/user";
pub const AQUARIUM_PATH: &str = "/aquarium";
pub const DEVICE_PATH: &str = "/device";
pub const LIGHT_LIBRARY_PATH: &str = "/reef-lights/library";
pub const WAVE_LIBRARY_PATH: &str = "/reef-wave/library";
pub const SUPPLEMENT_LIBRARY_PATH: &str = "/reef-dosing/supplement";

/// Authenticated client for the cloud account.
#[derive(Clone)]
pub struct CloudClient {
    http: HttpClient,
}

impl CloudClient {
    /// Build a secure client for `https://{host}` with the given credentials.
    pub fn new(
        host: &str,
        credentials: CloudCredentials,
        transport: &TransportConfig,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://{host}"))?;
        let reqwest_client = transport.build_client()?;
        Self::with_base_url(reqwest_client, base_url, credentials, retry)
    }

    /// Build around an explicit base URL (used by tests and proxies).
    pub fn with_base_url(
        http: reqwest::Client,
        base_url: Url,
        credentials: CloudCredentials,
        retry: RetryPolicy,
    ) -> Result<Self, Error> {
        let tokens = Arc::new(TokenManager::new(http.clone(), &base_url, credentials)?);
        let http = HttpClient::with_client(http, base_url, retry).with_auth(tokens);
        Ok(Self { http })
    }

    /// Obtain the first bearer token.
    pub async fn login(&self) -> Result<(), Error> {
        match self.http.token_manager() {
            Some(tokens) => tokens.renew().await,
            None => Err(Error::Authentication {
                message: "cloud client has no credentials".into(),
            }),
        }
    }

    /// The account name, used as the account identity in pairing events.
    pub fn username(&self) -> &str {
        self.http.token_manager().map_or("", |t| t.username())
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    // ── Wave library ─────────────────────────────────────────────────

    /// `POST /reef-wave/library`, returning the created wave.
    pub async fn create_wave(&self, wave: &Value) -> Result<Value, Error> {
        debug!("creating library wave");
        self.http
            .send(WAVE_LIBRARY_PATH, Method::Post, Some(wave))
            .await?
            .ok_or_else(|| Error::Deserialization {
                message: "wave creation returned no body".into(),
                body: String::new(),
            })
    }

    /// `PUT /reef-wave/library/{uid}`
    pub async fn edit_wave(&self, uid: &str, wave: &Value) -> Result<Option<Value>, Error> {
        debug!(uid, "editing library wave");
        self.http
            .send(&format!("{WAVE_LIBRARY_PATH}/{uid}"), Method::Put, Some(wave))
            .await
    }

    // ── Wave schedules ───────────────────────────────────────────────

    /// `GET /reef-wave/schedule/{hwid}`
    pub async fn wave_schedule(&self, hwid: &str) -> Result<Value, Error> {
        self.http.fetch(&format!("/reef-wave/schedule/{hwid}")).await
    }

    /// `PATCH /reef-wave/schedule/{hwid}` with a new interval list.
    pub async fn set_wave_schedule(&self, hwid: &str, schedule: &Value) -> Result<Option<Value>, Error> {
        debug!(hwid, "patching wave schedule");
        self.http
            .send(&format!("/reef-wave/schedule/{hwid}"), Method::Patch, Some(schedule))
            .await
    }
}
