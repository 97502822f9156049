//! Authenticated client for the therapy-session backend.
//!
//! Thin wrapper over reqwest that attaches the bearer token, builds endpoint
//! URLs and converts HTTP failures into human-readable errors. Token
//! acquisition and refresh are outside this client; it is handed a valid
//! token and nothing more.

pub mod multipart;
pub mod sessions;

use serde::de::DeserializeOwned;

pub use multipart::{
    CompletedPart, CompletionReceipt, MultipartApi, MultipartUpload, PresignedPart,
};

/// Backend API client. Cheap to clone through `Arc`; one per process.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Builds a client from the loaded configuration and the stored token.
    ///
    /// # Errors
    /// - If no token is stored and `THEREC_TOKEN` is unset
    pub fn from_config(config: &crate::config::TherecConfig) -> anyhow::Result<Self> {
        let token = crate::config::get_token()?.ok_or_else(|| {
            anyhow::anyhow!("No API token found. Run 'therec auth' to sign in first.")
        })?;
        Ok(Self::new(&config.backend.base_url, &token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POSTs a JSON body and decodes a JSON response.
    ///
    /// # Errors
    /// - If the request cannot be sent (connection, timeout)
    /// - If the backend answers with a non-success status
    /// - If the response body cannot be decoded
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        let url = self.url(path);
        tracing::debug!("POST {url}");

        let response = match self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_connect() {
                    format!(
                        "Could not connect to the backend at {}. Check backend.base_url in your config.",
                        self.base_url
                    )
                } else if e.is_timeout() {
                    "Backend request timed out. The server is not responding.".to_string()
                } else {
                    format!("Backend request failed: {e}")
                };
                return Err(anyhow::anyhow!(message));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = match status.as_u16() {
                401 => "Backend token is invalid or expired. Run 'therec auth' to update it."
                    .to_string(),
                403 => "You don't have permission for this patient or session.".to_string(),
                404 => format!("Backend resource not found ({url}): {body_text}"),
                409 => format!("Conflict: {body_text}"),
                429 => "Too many requests. Please wait and try again.".to_string(),
                500 | 502 | 503 | 504 => {
                    "The backend is experiencing issues. Please try again later.".to_string()
                }
                _ => format!("Backend error (status {status}): {body_text}"),
            };
            return Err(anyhow::anyhow!(message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse backend response from {url}: {e}"))
    }
}
