//! Per-user state: a memo cache of finished scrapes and the result the user
//! is currently looking at.

use std::collections::HashMap;
use std::fmt::Display;

use serde::Serialize;

use crate::filter::{ColumnInput, FilterConfig, FilterError, filter_dataset};
use crate::geocode::{Geocoder, enrich_with_coordinates};
use crate::join::inner_join;
use crate::scraper::{ScrapeOutcome, ScrapeReport, ScraperError, WebScraper};
use crate::types::{Dataset, DatasetError, ListingKind, PageLimit, Region, Service};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("No search has been run yet")]
    NoResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Listing(ListingKind),
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrapeKey {
    pub address: String,
    pub query: Query,
    pub page_limit: PageLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub service: Service,
    pub report: ScrapeReport,
}

/// Clinics offering every requested service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSearch {
    pub region: Region,
    pub services: Vec<Service>,
    pub dataset: Dataset,
    pub reports: Vec<ServiceReport>,
}

impl Display for ServiceSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<String> = self.services.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "Found {} clinic(s) in {} offering {}",
            self.dataset.len(),
            self.region,
            services.join(", ")
        )
    }
}

pub struct Session {
    scraper: WebScraper,
    root: String,
    cache: HashMap<ScrapeKey, ScrapeOutcome>,
    last_result: Option<Dataset>,
    last_region: Option<Region>,
}

impl Session {
    pub fn new() -> Result<Self, ScraperError> {
        Ok(Self::with_root(WebScraper::new()?, crate::BASE_URL))
    }

    /// Session scraping `root` instead of the live site. Region addresses
    /// become `{root}/{slug}/`.
    pub fn with_root(scraper: WebScraper, root: impl Into<String>) -> Self {
        Self {
            scraper,
            root: root.into().trim_end_matches('/').to_string(),
            cache: HashMap::new(),
            last_result: None,
            last_region: None,
        }
    }

    pub fn address(&self, region: Region) -> String {
        format!("{}/{}/", self.root, region.slug())
    }

    pub fn last_result(&self) -> Option<&Dataset> {
        self.last_result.as_ref()
    }

    pub fn last_region(&self) -> Option<Region> {
        self.last_region
    }

    pub fn cached_scrapes(&self) -> usize {
        self.cache.len()
    }

    /// Memoised scrape. Only successful scrapes are cached.
    pub async fn scrape(&mut self, key: ScrapeKey) -> Result<&ScrapeOutcome, ScraperError> {
        if self.cache.contains_key(&key) {
            log::info!("Cache hit for {:?}", key);
        } else {
            let outcome = match &key.query {
                Query::Listing(kind) => {
                    self.scraper
                        .scrape_listing(&key.address, *kind, key.page_limit)
                        .await?
                }
                Query::Service(slug) => self.scraper.scrape_service(&key.address, slug).await?,
            };
            self.cache.insert(key.clone(), outcome);
        }
        Ok(&self.cache[&key])
    }

    pub async fn search_listing(
        &mut self,
        region: Region,
        kind: ListingKind,
        page_limit: PageLimit,
    ) -> Result<ScrapeOutcome, SessionError> {
        let key = ScrapeKey {
            address: self.address(region),
            query: Query::Listing(kind),
            page_limit,
        };
        let outcome = self.scrape(key).await?.clone();
        self.last_result = Some(outcome.dataset.clone());
        self.last_region = Some(region);
        Ok(outcome)
    }

    /// Scrapes each service listing (memoised per service) and inner-joins
    /// them on clinic name.
    pub async fn search_services(
        &mut self,
        region: Region,
        services: &[Service],
    ) -> Result<ServiceSearch, SessionError> {
        let address = self.address(region);
        let mut datasets = Vec::with_capacity(services.len());
        let mut reports = Vec::with_capacity(services.len());
        for &service in services {
            let key = ScrapeKey {
                address: address.clone(),
                query: Query::Service(service.slug().to_string()),
                page_limit: PageLimit::Unbounded,
            };
            let outcome = self.scrape(key).await?;
            datasets.push(outcome.dataset.clone());
            reports.push(ServiceReport {
                service,
                report: outcome.report,
            });
        }

        let dataset = inner_join(datasets, crate::NAME_COLUMN)?;
        let search = ServiceSearch {
            region,
            services: services.to_vec(),
            dataset,
            reports,
        };
        log::info!("{}", search);

        self.last_result = Some(search.dataset.clone());
        self.last_region = Some(region);
        Ok(search)
    }

    /// Adds coordinates to the current result in place.
    pub async fn geocode_last_result<G: Geocoder>(
        &mut self,
        geocoder: &G,
    ) -> Result<&Dataset, SessionError> {
        let (Some(dataset), Some(region)) = (self.last_result.as_mut(), self.last_region) else {
            return Err(SessionError::NoResult);
        };
        enrich_with_coordinates(dataset, &region.to_string(), geocoder).await?;
        Ok(dataset)
    }

    /// Filters the current result without replacing it.
    pub fn filter_last_result(
        &self,
        inputs: &[ColumnInput],
        config: &FilterConfig,
    ) -> Result<Dataset, SessionError> {
        let dataset = self.last_result.as_ref().ok_or(SessionError::NoResult)?;
        Ok(filter_dataset(dataset, inputs, config)?)
    }
}
