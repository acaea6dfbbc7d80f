//! Fetch functions - retrieve report rows from the live reporting API.
//!
//! The source is a trait so the runner can be exercised against fakes; the
//! production implementation is a thin reqwest client around the upstream
//! technician-performance endpoint.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

use crate::pipeline::error::PipelineError;
use crate::pipeline::parse::rows_from_api_json;
use crate::pipeline::types::ReportRow;

/// A source of raw report rows for a requested date window.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_rows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ReportRow>, PipelineError>;
}

/// Client for the upstream reporting API. Failures come back as
/// `SourceUnavailable` so the runner can skip the period and move on.
pub struct LiveReportClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl LiveReportClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

        Ok(LiveReportClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ReportSource for LiveReportClient {
    async fn fetch_rows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ReportRow>, PipelineError> {
        let url = format!("{}/reports/technician-performance", self.base_url);
        info!("Fetching live report {} from {} to {}", url, start, end);

        let mut request = self.client.get(&url).query(&[
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
        ]);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "reporting API returned {status}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("bad API payload: {e}")))?;

        let rows = rows_from_api_json(&payload);
        info!("Live report returned {} rows", rows.len());
        Ok(rows)
    }
}
