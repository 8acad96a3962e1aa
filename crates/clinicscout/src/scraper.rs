use crate::parser::{ParseError, parse_current_page, parse_records};
use crate::schema::{SERVICE_SCHEMA, Schema};
use crate::types::{Dataset, ListingKind, PageLimit};

use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),
}

/// Result of fetching one listing page. Anything other than `Ok` ends
/// pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Ok(String),
    HttpError(u16),
    PageMismatch { requested: u32, actual: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    HttpStatus { page: u32, status: u16 },
    PageMismatch { requested: u32, actual: u32 },
    PageLimit { limit: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrapeReport {
    pub pages: u32,
    pub stop: StopReason,
}

impl Display for ScrapeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Processed {} page(s)! ", self.pages)?;
        match self.stop {
            StopReason::HttpStatus { page, status } => {
                write!(f, "Page {} returned status {}.", page, status)
            }
            StopReason::PageMismatch { requested, actual } => write!(
                f,
                "Requested page {} does not match actual page {}.",
                requested, actual
            ),
            StopReason::PageLimit { limit } => write!(f, "Page limit of {} reached.", limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeOutcome {
    pub dataset: Dataset,
    pub report: ScrapeReport,
}

enum PaginationState {
    Fetching(u32),
    Accumulating { page: u32, markup: String },
    Stopped(StopReason),
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
}

impl WebScraper {
    pub fn new() -> Result<Self, ScraperError> {
        let client = Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client })
    }

    /// Scrapes clinic or doctor listings under `address` (a region base
    /// address ending in `/`) until the site stops answering 200 or the page
    /// limit is reached.
    pub async fn scrape_listing(
        &self,
        address: &str,
        kind: ListingKind,
        limit: PageLimit,
    ) -> Result<ScrapeOutcome, ScraperError> {
        log::info!("Scraping {} listings from {} (page limit: {})", kind, address, limit);
        let base = format!("{}{}", address, kind.path());
        self.paginate(
            Schema::for_listing(kind),
            |page| format!("{}/?page={}", base, page),
            limit,
            false,
        )
        .await
    }

    /// Scrapes the clinics offering one diagnostic service. Every page's own
    /// current-page indicator must agree with the page requested, the site
    /// answers out-of-range pages with its last page instead of an error.
    pub async fn scrape_service(
        &self,
        address: &str,
        service_slug: &str,
    ) -> Result<ScrapeOutcome, ScraperError> {
        log::info!("Scraping '{}' service listings from {}", service_slug, address);
        self.paginate(
            &SERVICE_SCHEMA,
            |page| format!("{}diagnostika/{}/?page={}", address, service_slug, page),
            PageLimit::Unbounded,
            true,
        )
        .await
    }

    /// One GET. Non-200 statuses come back as [`FetchResult::HttpError`];
    /// only transport failures are errors. With `requested` set, the page's
    /// current-page indicator is checked before the markup is trusted.
    pub async fn fetch_page(
        &self,
        url: &str,
        requested: Option<u32>,
    ) -> Result<FetchResult, ScraperError> {
        log::info!("Fetching {}...", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(FetchResult::HttpError(status.as_u16()));
        }

        let markup = response
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?;

        if let Some(requested) = requested {
            let actual = parse_current_page(&markup)?;
            if actual != requested {
                return Ok(FetchResult::PageMismatch { requested, actual });
            }
        }

        Ok(FetchResult::Ok(markup))
    }

    async fn paginate(
        &self,
        schema: &Schema,
        page_url: impl Fn(u32) -> String,
        limit: PageLimit,
        check_page_indicator: bool,
    ) -> Result<ScrapeOutcome, ScraperError> {
        let mut dataset = Dataset::new(schema.columns());
        let mut pages = 0;
        let mut state = PaginationState::Fetching(1);

        let stop = loop {
            state = match state {
                PaginationState::Fetching(page) => {
                    let requested = check_page_indicator.then_some(page);
                    match self.fetch_page(&page_url(page), requested).await? {
                        FetchResult::Ok(markup) => PaginationState::Accumulating { page, markup },
                        FetchResult::HttpError(status) => {
                            PaginationState::Stopped(StopReason::HttpStatus { page, status })
                        }
                        FetchResult::PageMismatch { requested, actual } => {
                            PaginationState::Stopped(StopReason::PageMismatch { requested, actual })
                        }
                    }
                }
                PaginationState::Accumulating { page, markup } => {
                    let rows = parse_records(&markup, schema)?;
                    log::debug!("Page {} yielded {} row(s)", page, rows.len());
                    dataset.append(rows).map_err(ParseError::from)?;
                    pages = page;
                    match limit.max_pages() {
                        Some(n) if limit.is_reached(page) => {
                            PaginationState::Stopped(StopReason::PageLimit { limit: n })
                        }
                        _ => PaginationState::Fetching(page + 1),
                    }
                }
                PaginationState::Stopped(reason) => break reason,
            };
        };

        let report = ScrapeReport { pages, stop };
        log::info!("{} {} row(s) collected.", report, dataset.len());
        Ok(ScrapeOutcome { dataset, report })
    }
}
