use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};

use crate::core::error::{LauncherError, LauncherResult};

/// A response body being streamed to disk.
pub struct Body {
    /// `true` when the server honored the requested byte offset (HTTP 206).
    pub resumed: bool,
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, LauncherResult<Vec<u8>>>,
}

/// Network seam for everything the pipeline fetches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open `url` for streaming, asking the server to start at `offset`.
    async fn open(&self, url: &str, offset: u64) -> LauncherResult<Body>;

    /// Fetch a small text document (manifests, metadata).
    async fn get_text(&self, url: &str) -> LauncherResult<String>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str, offset: u64) -> LauncherResult<Body> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let resumed = offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        let content_length = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LauncherError::from))
            .boxed();

        Ok(Body {
            resumed,
            content_length,
            chunks,
        })
    }

    async fn get_text(&self, url: &str) -> LauncherResult<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}
