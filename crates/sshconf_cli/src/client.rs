//! Blocking `reqwest` client for the HTTP bulk transport.

use crate::credentials::Credentials;
use crate::error::CliResult;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use sshconf_sync_engine::{HttpClient, HttpResponse};
use std::time::Duration;
use zeroize::Zeroizing;

/// Sends authenticated JSON requests.
pub struct ReqwestClient {
    client: Client,
    authorization: Zeroizing<String>,
}

impl ReqwestClient {
    /// Builds a client that authenticates with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(credentials: &Credentials, timeout: Duration) -> CliResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sshconf/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            authorization: credentials.authorization(),
        })
    }
}

fn into_response(response: Response) -> Result<HttpResponse, String> {
    let status = response.status().as_u16();
    let body = response.bytes().map_err(|e| e.to_string())?;
    Ok(HttpResponse::new(status, body.to_vec()))
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(AUTHORIZATION, self.authorization.as_str())
            .send()
            .map_err(|e| e.to_string())?;
        into_response(response)
    }

    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.authorization.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| e.to_string())?;
        into_response(response)
    }
}
