//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! depend on a particular HTTP library; the CLI plugs in a blocking
//! `reqwest` client.

use crate::bulk::{BulkAck, BulkSnapshot, BulkUpload};
use crate::error::{SyncError, SyncResult};
use crate::transport::BulkTransport;
use crate::wire;
use parking_lot::RwLock;
use sshconf_core::{SetSchema, TERMINAL_SCHEMAS};
use tracing::debug;

/// Path of the bulk endpoint, relative to the base URL.
pub const BULK_ENDPOINT: &str = "/api/v1/terminal/bulk/";

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received
/// (connection refused, timeout, TLS failure). Error statuses are returned
/// as responses.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request with query parameters.
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// Bulk transport over HTTP with JSON bodies.
pub struct HttpBulkTransport<C: HttpClient> {
    /// Base URL of the API (e.g., "https://api.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Schemas used to decode snapshots.
    schemas: Vec<&'static SetSchema>,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpBulkTransport<C> {
    /// Creates a transport decoding the terminal schemas.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self::with_schemas(base_url, client, TERMINAL_SCHEMAS.to_vec())
    }

    /// Creates a transport decoding the given schemas.
    pub fn with_schemas(
        base_url: impl Into<String>,
        client: C,
        schemas: Vec<&'static SetSchema>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            schemas,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the bulk endpoint URL.
    pub fn bulk_url(&self) -> String {
        format!("{}{BULK_ENDPOINT}", self.base_url)
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn check(&self, sent: Result<HttpResponse, String>) -> SyncResult<Vec<u8>> {
        let response = sent.map_err(|e| {
            self.set_error(&e);
            SyncError::transport_retryable(e)
        })?;
        let error = match response.status {
            200..=299 => {
                self.clear_error();
                return Ok(response.body);
            }
            401 | 403 => SyncError::AuthenticationFailed(format!("status {}", response.status)),
            500..=599 => SyncError::ServerError(format!(
                "status {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )),
            status => SyncError::transport_fatal(format!("unexpected status {status}")),
        };
        self.set_error(&error.to_string());
        Err(error)
    }
}

impl<C: HttpClient> BulkTransport for HttpBulkTransport<C> {
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot> {
        let url = self.bulk_url();
        debug!(%url, cursor = ?last_synced, "GET bulk");
        let query: Vec<(&str, &str)> = last_synced
            .map(|cursor| vec![("last_synced", cursor)])
            .unwrap_or_default();
        let body = self.check(self.client.get(&url, &query))?;
        wire::decode_snapshot(&body, &self.schemas)
    }

    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck> {
        let url = self.bulk_url();
        debug!(
            %url,
            records = upload.record_count(),
            deletions = upload.deletion_count(),
            "POST bulk"
        );
        let body = wire::encode_upload(upload)?;
        let body = self.check(self.client.post(&url, body))?;
        wire::decode_ack(&body)
    }
}
