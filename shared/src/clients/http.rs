use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

/// Thin wrapper around a shared `reqwest::Client` for the two internal
/// collaborators this service calls: the external auth service and the
/// business backend. Both speak the same `X-Internal-Key` + JSON
/// convention, so one struct covers both with a `base_url` per instance.
#[derive(Clone)]
pub struct InternalApiClient {
    http: reqwest::Client,
    base_url: String,
    internal_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InternalApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unauthorized (status {0})")]
    Unauthorized(u16),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("timed out")]
    Timeout,
}

impl InternalApiClient {
    /// All internal HTTP calls carry a 10s timeout baked into the client
    /// itself; callers that need a tighter budget (e.g. the 5s owner
    /// fetch) wrap the call in `tokio::time::timeout` on top of this.
    pub fn new(base_url: impl Into<String>, internal_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            base_url: base_url.into(),
            internal_key: internal_key.into(),
        }
    }

    pub async fn post_bearer<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        bearer_token: &str,
        body: &B,
    ) -> Result<R, InternalApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {bearer_token}"))
            .header("X-Internal-Key", &self.internal_key)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, InternalApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .header("X-Internal-Key", &self.internal_key)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, InternalApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .header("X-Internal-Key", &self.internal_key)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, InternalApiError> {
        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(InternalApiError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InternalApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<R>().await.map_err(InternalApiError::Transport)
    }
}
