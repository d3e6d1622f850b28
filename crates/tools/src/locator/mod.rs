//! PrEP provider locator
//!
//! Drives a headless browser through the provider directory's search form,
//! extracts result entries and keeps those within the configured radius.
//!
//! Each lookup owns one WebDriver session for its whole duration. A semaphore
//! bounds how many sessions run at once; excess callers wait for a permit.

pub mod extract;
pub mod webdriver;

pub use extract::{filter_within_radius, parse_distance, parse_results, ResultSelectors};
pub use webdriver::{BrowserSession, WebDriverClient};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;

use chia_config::LocatorConfig;
use chia_core::ProviderRecord;

/// Locator errors
#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("Invalid ZIP code: {0}")]
    InvalidZip(String),

    #[error("WebDriver request failed: {0}")]
    Transport(String),

    #[error("WebDriver error {error}: {message}")]
    WebDriver { error: String, message: String },

    #[error("WebDriver session error: {0}")]
    Session(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

impl LocatorError {
    /// Errors worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LocatorError::InvalidZip(_) | LocatorError::Selector { .. }
        )
    }
}

impl From<LocatorError> for chia_core::Error {
    fn from(err: LocatorError) -> Self {
        chia_core::Error::Locator(err.to_string())
    }
}

/// Source of provider records for a ZIP code
#[async_trait]
pub trait ProviderDirectory: Send + Sync + 'static {
    /// Providers within the configured radius, nearest-first as listed by the source
    async fn locate_providers(&self, zip_code: &str) -> Result<Vec<ProviderRecord>, LocatorError>;

    fn name(&self) -> &str;
}

/// Browser-driven locator
pub struct ProviderLocator {
    config: LocatorConfig,
    client: WebDriverClient,
    selectors: ResultSelectors,
    permits: Arc<Semaphore>,
}

impl ProviderLocator {
    pub fn new(config: LocatorConfig) -> Result<Self, LocatorError> {
        let client = WebDriverClient::new(&config.webdriver_url, config.browser_args.clone())?;
        let selectors = ResultSelectors::compile(&config.selectors)?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1)));

        Ok(Self {
            config,
            client,
            selectors,
            permits,
        })
    }

    /// Sessions currently available
    pub fn available_sessions(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one search in a fresh browser session and return the page source
    async fn fetch_results_page(&self, zip_code: &str) -> Result<String, LocatorError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LocatorError::Session(e.to_string()))?;

        let session = self.client.new_session().await?;
        let result = self.search_in(&session, zip_code).await;

        if let Err(e) = session.quit().await {
            tracing::warn!(error = %e, "Failed to close WebDriver session");
        }

        result
    }

    async fn search_in(&self, session: &BrowserSession, zip_code: &str) -> Result<String, LocatorError> {
        let selectors = &self.config.selectors;

        session.goto(&self.config.base_url).await?;
        tokio::time::sleep(Duration::from_millis(self.config.page_load_wait_ms)).await;

        let search_box = session.find(&selectors.search_input).await?;
        session.clear(&search_box).await?;
        session.send_keys(&search_box, zip_code).await?;

        let submit = session.find(&selectors.submit_button).await?;
        session.click(&submit).await?;

        let deadline = Instant::now() + Duration::from_millis(self.config.results_wait_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));
        loop {
            if !session.find_all(&selectors.result_item).await?.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                tracing::debug!(zip = %zip_code, "No result items before deadline");
                break;
            }
            tokio::time::sleep(poll).await;
        }

        session.page_source().await
    }

    async fn locate_once(&self, zip_code: &str) -> Result<Vec<ProviderRecord>, LocatorError> {
        let html = self.fetch_results_page(zip_code).await?;
        let records = parse_results(&html, &self.selectors);
        let total = records.len();
        let kept = filter_within_radius(records, self.config.radius_miles);

        tracing::info!(
            zip = %zip_code,
            total,
            within_radius = kept.len(),
            radius_miles = self.config.radius_miles,
            "Provider search complete"
        );
        Ok(kept)
    }
}

#[async_trait]
impl ProviderDirectory for ProviderLocator {
    async fn locate_providers(&self, zip_code: &str) -> Result<Vec<ProviderRecord>, LocatorError> {
        let zip_code = zip_code.trim();
        if zip_code.is_empty() {
            return Err(LocatorError::InvalidZip("ZIP code is empty".to_string()));
        }

        let start = Instant::now();
        let mut attempt = 0u32;
        let result = loop {
            match self.locate_once(zip_code).await {
                Ok(records) => break Ok(records),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.config.backoff_for_attempt(attempt);
                    tracing::warn!(
                        zip = %zip_code,
                        attempt = attempt + 1,
                        backoff_ms = backoff,
                        error = %e,
                        "Provider search failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                },
                Err(e) => break Err(e),
            }
        };

        metrics::histogram!("chia_locator_seconds").record(start.elapsed().as_secs_f64());
        result
    }

    fn name(&self) -> &str {
        "preplocator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> LocatorConfig {
        LocatorConfig {
            webdriver_url: "http://127.0.0.1:1".to_string(),
            page_load_wait_ms: 0,
            ..LocatorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_zip_rejected() {
        let locator = ProviderLocator::new(unreachable_config()).unwrap();
        assert!(matches!(
            locator.locate_providers("   ").await,
            Err(LocatorError::InvalidZip(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_driver_surfaces_error() {
        let locator = ProviderLocator::new(unreachable_config()).unwrap();
        let err = locator.locate_providers("02906").await.unwrap_err();
        assert!(matches!(err, LocatorError::Transport(_)));
        // Permit released on the error path
        assert_eq!(locator.available_sessions(), 2);
    }

    #[test]
    fn test_retryable() {
        assert!(LocatorError::Transport("reset".into()).is_retryable());
        assert!(!LocatorError::InvalidZip("".into()).is_retryable());
    }

    #[test]
    fn test_into_core_error() {
        let err: chia_core::Error = LocatorError::ElementNotFound("h3".into()).into();
        assert!(matches!(err, chia_core::Error::Locator(_)));
    }
}
