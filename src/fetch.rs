use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that can hand back the HTML of a page.
///
/// Stages only talk to this trait, so the HTTP client can be swapped for an
/// in-memory source in tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP source with a desktop browser user agent.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let start = Instant::now();
        let body = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        debug!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(body)
    }
}
