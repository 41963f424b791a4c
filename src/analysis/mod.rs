//! Image analysis client.
//!
//! Each analyzable URL is sent to two HTTP endpoints (quality and metrics).
//! Both requests run concurrently; results are only published once both
//! have resolved.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::decoder::encode_uri_component;
use crate::models::{ApiResults, ResultField, ResultValue};
use crate::settings::ApiSettings;

mod parse;

use parse::{apply_fields, parse_body, PARSE_FAILURE};

// Set to false to silence per-request logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// How one endpoint answered, short of a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EndpointOutcome {
    Body(String),
    Status(u16),
}

pub struct AnalysisClient {
    client: Client,
    quality_url: String,
    metrics_url: String,
}

impl AnalysisClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(ms) = settings.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().context("failed to build HTTP client")?;

        let base = settings.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            quality_url: format!("{base}{}", settings.quality_path),
            metrics_url: format!("{base}{}", settings.metrics_path),
        })
    }

    /// Analyze one image. Never fails: every problem is written into the
    /// affected result cells as `Error: ...`.
    pub async fn analyze(&self, original_url: &str) -> ApiResults {
        let encoded = encode_uri_component(original_url);
        let quality_url = format!("{}?url={encoded}", self.quality_url);
        let metrics_url = format!("{}?url={encoded}", self.metrics_url);

        let (quality, metrics) = tokio::join!(self.fetch(&quality_url), self.fetch(&metrics_url));

        let mut results = ApiResults::default();
        match (quality, metrics) {
            (Ok(quality), Ok(metrics)) => {
                apply_outcome(&mut results, &ResultField::QUALITY, quality);
                apply_outcome(&mut results, &ResultField::METRICS, metrics);
            }
            (Err(err), _) | (_, Err(err)) => {
                log_warn!("Analysis request for {original_url} failed: {err}");
                results.fill(&ResultField::ALL, &ResultValue::error(err.to_string()));
            }
        }
        results
    }

    async fn fetch(&self, url: &str) -> Result<EndpointOutcome, reqwest::Error> {
        log_debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(EndpointOutcome::Status(status.as_u16()));
        }
        Ok(EndpointOutcome::Body(response.text().await?))
    }
}

fn apply_outcome(results: &mut ApiResults, fields: &[ResultField], outcome: EndpointOutcome) {
    match outcome {
        EndpointOutcome::Status(code) => {
            results.fill(fields, &ResultValue::error(code.to_string()));
        }
        EndpointOutcome::Body(body) => match parse_body(&body) {
            Some(map) => apply_fields(results, fields, &map),
            None => {
                log_warn!("Unparseable analysis response: {}", truncate(&body, 80));
                results.fill(fields, &ResultValue::error(PARSE_FAILURE));
            }
        },
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
