//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::io::Write;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// HTTP client that retries transient failures.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET `url` and deserialize the JSON body.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send request")?;

            let response = response.error_for_status().map_err(check_retryable)?;

            response
                .json::<T>()
                .await
                .with_context(|| format!("Failed to parse JSON response from {}", url))
        })
        .await
    }

    /// Like [`get_json`](Self::get_json), but a 404 yields `None`.
    pub async fn get_json_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if NonRetryableError::is_not_found(&e) => {
                debug!("{} returned 404", url);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Stream `url` into the writer returned by `create_writer`.
    ///
    /// The writer is recreated for every attempt.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        self.with_retry("Download", || async {
            let mut response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to start download request")?
                .error_for_status()
                .map_err(check_retryable)?;

            let mut writer = create_writer()?;
            let mut downloaded_bytes: u64 = 0;

            while let Some(chunk) = response
                .chunk()
                .await
                .context("Failed to read chunk from download stream")?
            {
                writer
                    .write_all(&chunk)
                    .context("Failed to write chunk to file")?;
                downloaded_bytes += chunk.len() as u64;
            }
            writer.flush().context("Failed to flush downloaded file")?;

            debug!("Downloaded {} bytes", downloaded_bytes);
            Ok(downloaded_bytes)
        })
        .await
    }

    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.downcast_ref::<NonRetryableError>().is_some() {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name, attempt, MAX_RETRIES, e, RETRY_DELAY_MS
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}
