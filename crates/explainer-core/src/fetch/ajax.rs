use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use explainer_config::AjaxConfig;
use explainer_protocol::{JobUpdate, StatusRequest, decode_status_response};

use super::{FetchError, StatusFetcher};

/// Maximum status response body (1 MB).
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Fetches job status by POSTing the `get_job_status` form to `admin-ajax.php`.
#[derive(Debug, Clone)]
pub struct AjaxStatusFetcher {
    client: reqwest::Client,
    url: String,
    nonce: String,
}

impl AjaxStatusFetcher {
    pub fn new(
        url: impl Into<String>,
        nonce: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Transport {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url: url.into(),
            nonce: nonce.into(),
        })
    }

    pub fn from_config(config: &AjaxConfig) -> Result<Self, FetchError> {
        Self::new(config.base_url(), config.nonce(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, job_id: &str) -> Result<JobUpdate, FetchError> {
        debug!(event = "core.fetch.request_started", job_id = job_id, url = %self.url);

        let response = self
            .client
            .post(&self.url)
            .form(&StatusRequest::new(job_id, &self.nonce))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len as usize > MAX_RESPONSE_BYTES)
        {
            return Err(FetchError::ResponseTooLarge {
                limit: MAX_RESPONSE_BYTES,
            });
        }

        let body = response.bytes().await?;
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(FetchError::ResponseTooLarge {
                limit: MAX_RESPONSE_BYTES,
            });
        }

        let body = String::from_utf8_lossy(&body);
        let update = decode_status_response(&body)?;

        debug!(
            event = "core.fetch.request_completed",
            job_id = job_id,
            status = %update.status(),
        );
        Ok(update)
    }
}

impl StatusFetcher for AjaxStatusFetcher {
    fn fetch_status<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<JobUpdate, FetchError>> {
        Box::pin(self.request(job_id))
    }
}
