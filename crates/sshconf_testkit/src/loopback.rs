//! A loopback HTTP client that routes requests to an [`InMemoryRemote`].
//!
//! Requests go through the full JSON encoding, so tests using it exercise
//! [`HttpBulkTransport`](sshconf_sync_engine::HttpBulkTransport) the same
//! way a real server would.

use crate::remote::InMemoryRemote;
use parking_lot::Mutex;
use sshconf_core::{SetSchema, TERMINAL_SCHEMAS};
use sshconf_sync_engine::{wire, BulkTransport, HttpClient, HttpResponse, SyncError, BULK_ENDPOINT};
use std::sync::Arc;

/// Routes bulk requests to a shared in-memory remote.
pub struct LoopbackClient {
    remote: Arc<InMemoryRemote>,
    schemas: Vec<&'static SetSchema>,
    forced_status: Mutex<Option<u16>>,
    requests: Mutex<Vec<String>>,
}

impl LoopbackClient {
    /// Creates a client for the terminal schemas.
    pub fn new(remote: Arc<InMemoryRemote>) -> Self {
        Self {
            remote,
            schemas: TERMINAL_SCHEMAS.to_vec(),
            forced_status: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `status` and an empty body until cleared.
    pub fn force_status(&self, status: Option<u16>) {
        *self.forced_status.lock() = status;
    }

    /// Returns the request lines seen so far, e.g. `GET /api/v1/terminal/bulk/`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    fn route(&self, method: &str, url: &str) -> Option<HttpResponse> {
        let path = url.find("/api/").map_or(url, |i| &url[i..]);
        self.requests.lock().push(format!("{method} {path}"));
        if let Some(status) = *self.forced_status.lock() {
            return Some(HttpResponse::new(status, Vec::new()));
        }
        if path != BULK_ENDPOINT {
            return Some(HttpResponse::new(404, "not found"));
        }
        None
    }
}

fn respond(result: Result<Vec<u8>, SyncError>) -> Result<HttpResponse, String> {
    match result {
        Ok(body) => Ok(HttpResponse::new(200, body)),
        Err(SyncError::NotConnected) => Err("connection refused".into()),
        Err(e) => Ok(HttpResponse::new(400, e.to_string())),
    }
}

impl HttpClient for LoopbackClient {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, String> {
        if let Some(response) = self.route("GET", url) {
            return Ok(response);
        }
        let cursor = query
            .iter()
            .find(|(key, _)| *key == "last_synced")
            .map(|(_, value)| *value);
        respond(
            self.remote
                .get_bulk(cursor)
                .and_then(|snapshot| wire::encode_snapshot(&snapshot)),
        )
    }

    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        if let Some(response) = self.route("POST", url) {
            return Ok(response);
        }
        respond(
            wire::decode_upload(&body, &self.schemas)
                .and_then(|upload| self.remote.post_bulk(&upload))
                .and_then(|ack| wire::encode_ack(&ack)),
        )
    }
}
