//! HTTP retrieval of per-document index fragments.
//!
//! The fragment URL is `base_url` joined with the document's fragment path
//! (its extension replaced by the configured suffix). The response body
//! must be a JSON object of `{table: {"entries": {...}}}`.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;

use idx_sync_core::models::DocumentFragment;

use crate::config::FetchConfig;
use crate::traits::{DocumentRef, FragmentSource};

pub struct HttpFragmentSource {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl HttpFragmentSource {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .with_context(|| format!("Invalid fetch.base_url: {}", config.base_url))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
        })
    }

    pub fn fragment_url(&self, doc: &DocumentRef) -> Result<Url> {
        self.base_url
            .join(doc.fragment_path.trim_start_matches('/'))
            .with_context(|| format!("Cannot build fragment URL for {}", doc.fragment_path))
    }
}

#[async_trait]
impl FragmentSource for HttpFragmentSource {
    async fn fetch(&self, doc: &DocumentRef) -> Result<DocumentFragment> {
        let url = self.fragment_url(doc)?;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: serde_json::Value = response
                            .json()
                            .await
                            .with_context(|| format!("Fragment at {} is not JSON", url))?;
                        return DocumentFragment::from_json(doc.key.clone(), body);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("HTTP {} from {}", status, url));
                        continue;
                    }

                    bail!("HTTP {} from {}", status, url);
                }
                Err(e) => {
                    last_err = Some(anyhow::Error::new(e).context(format!("GET {}", url)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Fetch failed after retries: {}", url)))
    }
}
