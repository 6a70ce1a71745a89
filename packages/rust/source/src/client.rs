//! HTTP client for the tender search and detail endpoints.

use std::time::Duration;

use chrono::{Local, NaiveDate};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use tenderwatch_shared::{
    ProjectDetail, ProjectSummary, Result, SourceConfig, TenderError, value_to_string,
};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("tenderwatch/", env!("CARGO_PKG_VERSION"));

/// Publication types worth a detail fetch.
pub const ACTIONABLE_PUB_TYPES: [&str; 2] = ["tender", "advance_notice"];

/// Process type filter sent with every search.
const PROCESS_TYPES: &str = "open";

// ---------------------------------------------------------------------------
// SummaryQuery
// ---------------------------------------------------------------------------

/// Search parameters for one run.
#[derive(Debug, Clone)]
pub struct SummaryQuery {
    pub cpv_codes: Vec<String>,
    pub language: String,
    pub lookback_days: u32,
    pub max_pages: u32,
}

impl From<&SourceConfig> for SummaryQuery {
    fn from(config: &SourceConfig) -> Self {
        Self {
            cpv_codes: config.cpv_codes.clone(),
            language: config.language.clone(),
            lookback_days: config.lookback_days,
            max_pages: config.max_pages,
        }
    }
}

/// First publication day included in the search window.
pub fn publication_window_start(today: NaiveDate, lookback_days: u32) -> NaiveDate {
    today - chrono::Duration::days(i64::from(lookback_days))
}

/// Whether a summary is a tender or advance notice with both identifiers set.
pub fn is_actionable(summary: &ProjectSummary) -> bool {
    let pub_type = summary
        .pub_type
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    ACTIONABLE_PUB_TYPES.contains(&pub_type.as_str())
        && summary.id.is_some()
        && summary.publication_id.is_some()
}

// ---------------------------------------------------------------------------
// SourceClient
// ---------------------------------------------------------------------------

/// Client for the tender API. Failures never propagate out of the fetch
/// operations: they truncate or drop and are logged.
pub struct SourceClient {
    config: SourceConfig,
    client: Client,
}

impl SourceClient {
    /// Create a client with the configured timeout.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TenderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Page through the search endpoint and collect all summaries.
    ///
    /// Stops on the first failed page, a page without `projects`, a missing
    /// cursor, a short page, or after `max_pages` requests.
    #[instrument(skip_all, fields(cpv = ?query.cpv_codes, lookback_days = query.lookback_days))]
    pub async fn fetch_summaries(&self, query: &SummaryQuery) -> Vec<ProjectSummary> {
        let since = publication_window_start(Local::now().date_naive(), query.lookback_days)
            .format("%Y-%m-%d")
            .to_string();

        info!(%since, max_pages = query.max_pages, "fetching project summaries");

        let mut summaries = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=query.max_pages {
            let mut params: Vec<(&str, String)> = vec![
                ("lang", query.language.clone()),
                ("processTypes", PROCESS_TYPES.to_string()),
            ];
            params.extend(query.cpv_codes.iter().map(|c| ("cpvCodes", c.clone())));
            params.push(("newestPublicationFrom", since.clone()));
            if let Some(c) = &cursor {
                params.push(("lastItem", c.clone()));
            }

            debug!(page, cursor = ?cursor, "requesting search page");
            let data = match self.get_json(&self.config.search_path, &params).await {
                Ok(data) => data,
                Err(e) => {
                    error!(page, error = %e, "search request failed, stopping pagination");
                    break;
                }
            };

            let Some(projects) = data.get("projects").and_then(Value::as_array) else {
                warn!(page, "search response has no projects, stopping pagination");
                break;
            };

            let page_len = projects.len();
            for project in projects {
                match serde_json::from_value::<ProjectSummary>(project.clone()) {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => warn!(page, error = %e, "skipping undecodable summary"),
                }
            }

            let pagination = data.get("pagination");
            cursor = pagination
                .and_then(|p| p.get("lastItem"))
                .and_then(value_to_string);
            let items_per_page = pagination
                .and_then(|p| p.get("itemsPerPage"))
                .and_then(Value::as_u64);

            if cursor.is_none() {
                debug!(page, "no cursor returned, last page reached");
                break;
            }
            if items_per_page.is_some_and(|per_page| (page_len as u64) < per_page) {
                debug!(page, page_len, ?items_per_page, "short page, last page reached");
                break;
            }
        }

        info!(count = summaries.len(), "fetched project summaries");
        summaries
    }

    /// Fetch detail documents for actionable summaries, in input order.
    #[instrument(skip_all, fields(summaries = summaries.len()))]
    pub async fn fetch_details(&self, summaries: &[ProjectSummary]) -> Vec<ProjectDetail> {
        info!("fetching project details");

        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut details = Vec::new();
        let mut requested = false;

        for summary in summaries {
            if !is_actionable(summary) {
                debug!(
                    project_id = ?summary.id,
                    pub_type = ?summary.pub_type,
                    "skipping non-actionable summary"
                );
                continue;
            }
            let (Some(project_id), Some(publication_id)) =
                (summary.id.as_deref(), summary.publication_id.as_deref())
            else {
                continue;
            };

            if requested && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            requested = true;

            let path = self
                .config
                .detail_path_template
                .replace("{projectId}", project_id)
                .replace("{publicationId}", publication_id);

            debug!(project_id, publication_id, "fetching detail");
            match self.get_json(&path, &[]).await {
                Ok(Value::Object(map)) if !map.is_empty() => {
                    details.push(ProjectDetail(Value::Object(map)));
                }
                Ok(_) => warn!(project_id, "empty detail returned, dropping project"),
                Err(e) => warn!(project_id, error = %e, "detail fetch failed, dropping project"),
            }
        }

        info!(
            fetched = details.len(),
            total = summaries.len(),
            "fetched project details"
        );
        details
    }

    /// GET `path` relative to the base URL and decode the JSON body.
    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| TenderError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(TenderError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TenderError::Network(format!("{url}: failed to read body: {e}")))?;

        serde_json::from_str(&body)
            .map_err(|e| TenderError::parse(format!("{url}: invalid JSON: {e}")))
    }
}
