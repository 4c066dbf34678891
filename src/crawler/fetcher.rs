//! Rate-limited HTTP retrieval
//!
//! The fetcher is a single worker draining a capacity-1 queue: enqueueing
//! blocks while a request is in flight, and the worker sleeps the configured
//! delay after every attempt. That serial loop is the crawl's global rate
//! gate.
//!
//! Each page's URL is resolved before the request: against the referrer page
//! when one is known, then against the base (the scheme and host of the
//! starting URL), so relative links discovered in HTML come out absolute.

use crate::crawler::FailedPage;
use crate::page::Page;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Queue capacity; a single slot gives serial per-request back-pressure
const QUEUE_CAPACITY: usize = 1;
const DELIVERY_CAPACITY: usize = 1;

/// Error stream capacity; sends are non-blocking, overflow drops the page
const ERRORS_CAPACITY: usize = 64;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),
}

/// Output streams handed to the downstream consumer
pub struct FetcherStreams {
    pub delivery: mpsc::Receiver<Page>,
    pub errors: mpsc::Receiver<FailedPage>,
}

/// Single-worker HTTP fetcher with a global inter-request delay
pub struct Fetcher {
    base: Url,
    delay: Duration,
    client: Client,
    queue_tx: mpsc::Sender<Page>,
    queue_rx: mpsc::Receiver<Page>,
    delivery_tx: mpsc::Sender<Page>,
    errors_tx: mpsc::Sender<FailedPage>,
}

impl Fetcher {
    /// Creates a fetcher for the given starting URL
    ///
    /// # Arguments
    ///
    /// * `start_url` - The starting URL; its scheme and host become the base
    ///   that relative links resolve against
    /// * `delay` - Sleep between consecutive requests
    ///
    /// # Returns
    ///
    /// The fetcher plus its delivery and error streams
    pub fn new(start_url: &str, delay: Duration) -> Result<(Self, FetcherStreams), FetchError> {
        let invalid = |source| FetchError::InvalidUrl {
            url: start_url.to_string(),
            source,
        };

        // The base is the origin only; paths come from referrers
        let base = Url::parse(start_url)
            .map_err(invalid)?
            .join("/")
            .map_err(invalid)?;

        let client = Client::builder()
            .user_agent(concat!("morsel/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .gzip(true)
            .build()?;

        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_CAPACITY);

        let fetcher = Fetcher {
            base,
            delay,
            client,
            queue_tx,
            queue_rx,
            delivery_tx,
            errors_tx,
        };

        let streams = FetcherStreams {
            delivery: delivery_rx,
            errors: errors_rx,
        };

        Ok((fetcher, streams))
    }

    /// Returns a sender for enqueueing pages to fetch
    pub fn queue(&self) -> mpsc::Sender<Page> {
        self.queue_tx.clone()
    }

    /// Spawns the worker task
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("fetcher: starting");

            while let Some(page) = self.queue_rx.recv().await {
                match self.fetch(page).await {
                    Ok(page) => {
                        if self.delivery_tx.send(page).await.is_err() {
                            tracing::warn!("fetcher: delivery stream closed, stopping");
                            return;
                        }
                    }
                    Err(failed) => self.reject(failed),
                }

                tokio::time::sleep(self.delay).await;
            }
        })
    }

    /// Resolves a page's discovered URL to the absolute URL to request
    ///
    /// The URL is joined against the referrer page when one is recorded,
    /// then against the base. Joining an already-absolute URL leaves it
    /// unchanged, so off-base absolute links survive resolution.
    fn resolve(&self, page: &Page) -> Result<Url, FetchError> {
        let invalid = |source| FetchError::InvalidUrl {
            url: page.url.clone(),
            source,
        };

        let referred = match page.referrer_url.as_deref() {
            Some(referrer) if !referrer.is_empty() => {
                let referrer_url = Url::parse(referrer).map_err(|source| {
                    FetchError::InvalidUrl {
                        url: referrer.to_string(),
                        source,
                    }
                })?;
                referrer_url.join(&page.url).map_err(invalid)?
            }
            _ => self.base.join(&page.url).map_err(invalid)?,
        };

        self.base.join(referred.as_str()).map_err(invalid)
    }

    async fn fetch(&self, mut page: Page) -> Result<Page, FailedPage> {
        let full_url = match self.resolve(&page) {
            Ok(url) => url,
            Err(e) => return Err(FailedPage::new(page, e)),
        };
        page.full_url = Some(full_url.to_string());

        let response = match self.client.get(full_url).send().await {
            Ok(response) => response,
            Err(e) => return Err(FailedPage::new(page, FetchError::Http(e))),
        };

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(bytes) => page.body = bytes.to_vec(),
            Err(e) => return Err(FailedPage::new(page, FetchError::Http(e))),
        }

        if !(200..=302).contains(&status) {
            return Err(FailedPage::new(page, FetchError::Status(status)));
        }

        tracing::info!("fetcher: fetched {}", page.url);
        page.final_url = Some(final_url.to_string());

        if page.is_file {
            let name = file_name(disposition.as_deref(), &final_url);
            tracing::info!(
                "fetcher: file \"{}\" from {} ({} bytes)",
                name,
                final_url,
                page.body.len()
            );
            page.file_name = Some(name);
        }

        Ok(page)
    }

    fn reject(&self, failed: FailedPage) {
        tracing::error!(
            "fetcher: error fetching {}: {}",
            failed.page.url,
            failed.error
        );

        if self.errors_tx.try_send(failed).is_err() {
            tracing::error!("fetcher: error stream saturated, dropping failed page");
        }
    }
}

/// Derives a file name from the Content-Disposition header or the final URL
fn file_name(disposition: Option<&str>, final_url: &Url) -> String {
    if let Some(name) = disposition.and_then(disposition_file_name) {
        if !name.is_empty() {
            return name;
        }
    }

    final_url
        .path()
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("index")
        .to_string()
}

/// Extracts the `filename` parameter from a Content-Disposition value
fn disposition_file_name(header: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if part.len() >= 9 && part[..9].eq_ignore_ascii_case("filename=") {
            return Some(part[9..].trim().trim_matches('"').to_string());
        }
    }
    None
}
