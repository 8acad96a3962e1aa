use std::sync::Arc;

use clinicscout::export::to_csv;
use clinicscout::filter::{self, ColumnInput, FilterConfig};
use clinicscout::geocode::{MapPoint, NominatimGeocoder, map_points};
use clinicscout::scraper::ScrapeReport;
use clinicscout::session::{ServiceReport, SessionError};
use clinicscout::types::{ListingKind, PageLimit, Region, Service};
use clinicscout::{Dataset, Session};
use rmcp::{
    ServerHandler,
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{ErrorData as McpError, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One instance per MCP session, so every client gets its own scrape cache
/// and last result.
#[derive(Clone)]
pub struct McpServer {
    session: Arc<Mutex<Session>>,
    geocoder: NominatimGeocoder,
    tool_router: ToolRouter<Self>,
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String, McpError> {
    serde_json::to_string_pretty(value)
        .inspect_err(|e| log::error!("Serialization error: {e:?}"))
        .map_err(|e| McpError::internal_error(format!("Failed to serialize {what}: {e}"), None))
}

fn session_error(e: SessionError) -> McpError {
    log::error!("Session error: {e}");
    match e {
        SessionError::NoResult | SessionError::Filter(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        SessionError::Scraper(_) | SessionError::Dataset(_) => {
            McpError::internal_error(e.to_string(), None)
        }
    }
}

#[tool_router]
impl McpServer {
    pub fn new() -> Result<Self, anyhow::Error> {
        Ok(Self {
            session: Arc::new(Mutex::new(Session::new()?)),
            geocoder: NominatimGeocoder::new()?,
            tool_router: Self::tool_router(),
        })
    }

    #[tool(
        name = "scrape_listing",
        description = "Scrape clinic (ЛПУ) or doctor listings of a region from prodoctorov.ru. Pages are fetched in order until the site stops answering 200 or `page_limit` (1-20) pages were collected. Repeated identical queries are served from the session cache. The rows become the session's current result."
    )]
    pub async fn scrape_listing(
        &self,
        Parameters(params): Parameters<ScrapeListingParams>,
    ) -> Result<String, McpError> {
        let page_limit = PageLimit::try_from(params.page_limit)
            .inspect_err(|e| log::error!("Invalid params: {e:?}"))
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let outcome = self
            .session
            .lock()
            .await
            .search_listing(params.region, params.kind, page_limit)
            .await
            .map_err(session_error)?;

        to_json(
            &ListingResponse {
                message: outcome.report.to_string(),
                report: outcome.report,
                rows: &outcome.dataset,
            },
            "listing",
        )
    }

    #[tool(
        name = "find_clinics_by_services",
        description = "Find clinics of a region offering every one of the given diagnostic services (mri, ct, xray). Each service listing is scraped in full, then the listings are inner-joined on clinic name. Set `geocode` to add lat/lon columns and map points. The joined rows become the session's current result."
    )]
    pub async fn find_clinics_by_services(
        &self,
        Parameters(params): Parameters<FindClinicsParams>,
    ) -> Result<String, McpError> {
        if params.services.is_empty() {
            return Err(McpError::invalid_params(
                "at least one service is required",
                None,
            ));
        }

        let mut session = self.session.lock().await;
        let search = session
            .search_services(params.region, &params.services)
            .await
            .map_err(session_error)?;

        let (rows, points) = if params.geocode {
            let rows = session
                .geocode_last_result(&self.geocoder)
                .await
                .map_err(session_error)?
                .clone();
            let points = map_points(&rows);
            (rows, Some(points))
        } else {
            (search.dataset.clone(), None)
        };

        to_json(
            &ServicesResponse {
                summary: search.to_string(),
                reports: &search.reports,
                rows: &rows,
                map_points: points,
            },
            "service search",
        )
    }

    #[tool(
        name = "describe_columns",
        description = "Describe the columns of the session's current result: each column's inferred kind (date, numeric, categorical, text) and, for categorical columns, the values a filter can choose from."
    )]
    pub async fn describe_columns(&self) -> Result<String, McpError> {
        let session = self.session.lock().await;
        let dataset = session
            .last_result()
            .ok_or_else(|| session_error(SessionError::NoResult))?;
        let columns = filter::describe_columns(dataset, &FilterConfig::default())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        to_json(&columns, "columns")
    }

    #[tool(
        name = "filter_last_result",
        description = "Filter the session's current result. Each filter names a column and a value interpreted by the column's kind: numeric and date columns take `min..max`, `min..`, `..max`, a single value or exact values as `a|b`; categorical columns take `a|b|c`; text columns take a case-insensitive substring. An empty value filters nothing. The current result itself is not replaced. Output as JSON rows or CSV text."
    )]
    pub async fn filter_last_result(
        &self,
        Parameters(params): Parameters<FilterParams>,
    ) -> Result<String, McpError> {
        let config = params.config.unwrap_or_default();
        let filtered = self
            .session
            .lock()
            .await
            .filter_last_result(&params.filters, &config)
            .map_err(session_error)?;

        match params.format {
            TableFormat::Json => to_json(&filtered, "rows"),
            TableFormat::Csv => {
                let bytes = to_csv(&filtered)
                    .map_err(|e| McpError::internal_error(format!("Failed to write CSV: {e}"), None))?;
                String::from_utf8(bytes)
                    .map_err(|e| McpError::internal_error(format!("Invalid CSV text: {e}"), None))
            }
        }
    }
}

#[derive(Serialize)]
struct ListingResponse<'a> {
    message: String,
    report: ScrapeReport,
    rows: &'a Dataset,
}

#[derive(Serialize)]
struct ServicesResponse<'a> {
    summary: String,
    reports: &'a [ServiceReport],
    rows: &'a Dataset,
    #[serde(skip_serializing_if = "Option::is_none")]
    map_points: Option<Vec<MapPoint>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScrapeListingParams {
    region: Region,
    kind: ListingKind,
    /// Number of pages to collect, 1-20. Omit to scrape until the site runs out.
    page_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindClinicsParams {
    region: Region,
    services: Vec<Service>,
    #[serde(default)]
    geocode: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FilterParams {
    #[serde(default)]
    filters: Vec<ColumnInput>,
    config: Option<FilterConfig>,
    #[serde(default)]
    format: TableFormat,
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(include_str!("./instructions.md").to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tools_need_a_result_first() {
        let server = McpServer::new().unwrap();

        let err = server.describe_columns().await.unwrap_err();
        assert!(err.message.contains("No search has been run yet"));

        let params = FilterParams {
            filters: vec![],
            config: None,
            format: TableFormat::Csv,
        };
        assert!(server.filter_last_result(Parameters(params)).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_page_limit_is_rejected() {
        let server = McpServer::new().unwrap();
        let params: ScrapeListingParams = serde_json::from_value(serde_json::json!({
            "region": "sochi",
            "kind": "clinics",
            "page_limit": 21
        }))
        .unwrap();
        assert!(server.scrape_listing(Parameters(params)).await.is_err());
    }

    #[test]
    fn test_filter_params_defaults() {
        let params: FilterParams = serde_json::from_value(serde_json::json!({
            "filters": [{"column": "Цены", "value": "1000..2000"}]
        }))
        .unwrap();
        assert_eq!(params.filters[0].column, "Цены");
        assert!(matches!(params.format, TableFormat::Json));
        assert!(params.config.is_none());
    }
}
