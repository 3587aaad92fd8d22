// ── Sync engine ──
//
// Moves payloads between a device and its document. Fetches of one
// selection run concurrently and are joined before the document is
// updated; retries inside a single source stay sequential (see
// `HttpClient::fetch`). Failed sources keep their previous payload.

use futures_util::future::join_all;
use reefsync_api::{HttpClient, Method};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::store::Document;

/// Per-source outcome of one fan-out fetch.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: Vec<String>,
    pub failed: Vec<(String, reefsync_api::Error)>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|(name, _)| name.as_str())
    }
}

pub struct SyncEngine {
    label: String,
    client: HttpClient,
    in_error: bool,
}

impl SyncEngine {
    pub fn new(label: impl Into<String>, client: HttpClient) -> Self {
        Self {
            label: label.into(),
            client,
            in_error: false,
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Set when the last fetch left at least one source with exhausted
    /// retries; cleared by the next fetch that completes cleanly.
    pub fn in_error(&self) -> bool {
        self.in_error
    }

    /// Fetch every named source concurrently and store the results.
    pub async fn fetch(&mut self, doc: &mut Document, names: &[String]) -> FetchReport {
        let client = &self.client;
        let results = join_all(names.iter().map(|name| async move {
            let result = client.fetch(name).await;
            (name.clone(), result)
        }))
        .await;

        let mut report = FetchReport::default();
        for (name, result) in results {
            match result {
                Ok(payload) => {
                    doc.sources.set_payload(&name, payload);
                    report.fetched.push(name);
                }
                Err(e) => {
                    warn!(device = %self.label, source = %name, error = %e, "fetch failed, keeping cached payload");
                    report.failed.push((name, e));
                }
            }
        }

        self.in_error = !report.is_complete();
        debug!(
            device = %self.label,
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            "fetch complete"
        );
        report
    }

    /// Send a write and cache the response envelope in `message`.
    pub async fn push(
        &self,
        doc: &mut Document,
        path: &str,
        method: Method,
        payload: Option<&Value>,
    ) -> Result<(), CoreError> {
        let body = self.client.send(path, method, payload).await?;
        doc.set_message(body);
        Ok(())
    }
}
