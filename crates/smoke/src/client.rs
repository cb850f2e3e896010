use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use schema::{HealthResponse, PredictResponse};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmokeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not download sample image {url}: status {status}")]
    Download { url: String, status: StatusCode },
}

/// What the gateway answered: a parsed body on success, the raw text otherwise.
#[derive(Debug)]
pub enum Reply<T> {
    Ok { status: StatusCode, body: T },
    Failed { status: StatusCode, body: String },
}

impl<T> Reply<T> {
    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Ok { status, .. } | Reply::Failed { status, .. } => *status,
        }
    }
}

pub struct SmokeClient {
    http: Client,
    base_url: String,
}

impl SmokeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SmokeError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SmokeError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<Reply<HealthResponse>, SmokeError> {
        let url = format!("{}/api/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| SmokeError::Transport {
                url: url.clone(),
                source,
            })?;
        read_reply(&url, response).await
    }

    /// Upload `bytes` as the multipart `file` field of `/api/predict`.
    pub async fn predict(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Reply<PredictResponse>, SmokeError> {
        let url = format!("{}/api/predict", self.base_url);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type_for(Path::new(file_name)))
            .map_err(|source| SmokeError::Transport {
                url: url.clone(),
                source,
            })?;

        let response = self
            .http
            .post(&url)
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|source| SmokeError::Transport {
                url: url.clone(),
                source,
            })?;
        read_reply(&url, response).await
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>, SmokeError> {
        let transport = |source| SmokeError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.http.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SmokeError::Download {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.bytes().await.map_err(transport)?.to_vec())
    }
}

async fn read_reply<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<Reply<T>, SmokeError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|source| SmokeError::Transport {
            url: url.to_string(),
            source,
        })?;

    if !status.is_success() {
        return Ok(Reply::Failed { status, body: text });
    }

    match serde_json::from_str(&text) {
        Ok(body) => Ok(Reply::Ok { status, body }),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Unexpected response body");
            Ok(Reply::Failed { status, body: text })
        }
    }
}

/// MIME type sent with an upload, from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}
