use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::query::build_query;
use super::record::TranscriptRecord;
use super::request::SearchRequest;
use super::retry::{RetryPolicy, RetryStop};
use crate::bigquery::{BigQueryError, QueryService};
use crate::config::{Settings, TableNames};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("days back must be zero or positive, got {0}")]
    InvalidDaysBack(i64),

    #[error("search term must not be empty")]
    EmptyTerm,

    #[error("region must not be empty")]
    EmptyRegion,

    #[error("result limit must be greater than zero")]
    InvalidLimit,

    #[error("query failed in every region: {}", summarize(.failures))]
    RegionsExhausted { failures: Vec<RegionFailure> },

    #[error("query failed in {region}: {source}")]
    Unrecoverable {
        region: String,
        source: BigQueryError,
    },

    #[error("malformed row from {region}: {reason}")]
    MalformedRow { region: String, reason: String },

    #[error("search cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub struct RegionFailure {
    pub region: String,
    pub error: BigQueryError,
}

fn summarize(failures: &[RegionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.region, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Rows from the first region that answered, in service order (newest first).
/// Empty `records` means no transcript matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub region: String,
    pub records: Vec<TranscriptRecord>,
}

/// Regions to try, in order. The default region expands to the fallback chain;
/// any other region is tried alone.
pub fn candidate_regions(preferred: &str, default: &str, fallback: &[String]) -> Vec<String> {
    if preferred.eq_ignore_ascii_case(default) && !fallback.is_empty() {
        fallback.to_vec()
    } else {
        vec![preferred.to_string()]
    }
}

pub struct TranscriptSearcher<S> {
    service: S,
    tables: TableNames,
    job_label: String,
    default_region: String,
    fallback_regions: Vec<String>,
    retry: RetryPolicy,
}

impl<S: QueryService> TranscriptSearcher<S> {
    pub fn new(service: S, settings: &Settings) -> Self {
        Self {
            service,
            tables: settings.tables.clone(),
            job_label: settings.job_label.clone(),
            default_region: settings.default_region.clone(),
            fallback_regions: settings.fallback_regions.clone(),
            retry: settings.retry,
        }
    }

    /// Try each candidate region in turn; the first success wins and later regions
    /// are never queried. Only exhausting every region (or a failure no region can fix) is fatal.
    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let regions = candidate_regions(
            request.preferred_region(),
            &self.default_region,
            &self.fallback_regions,
        );
        let job = build_query(request, &self.tables, &self.job_label, Utc::now());
        let mut failures = Vec::with_capacity(regions.len());

        for (i, region) in regions.iter().enumerate() {
            info!(region = %region, candidate = i + 1, of = regions.len(), "querying region");

            match self
                .retry
                .run(cancel, || self.service.run_query(&job, region))
                .await
            {
                Ok(result) => {
                    let records = result
                        .rows
                        .iter()
                        .map(TranscriptRecord::from_row)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|reason| SearchError::MalformedRow {
                            region: region.clone(),
                            reason,
                        })?;
                    info!(region = %region, matches = records.len(), "search complete");
                    return Ok(SearchOutcome {
                        region: region.clone(),
                        records,
                    });
                }
                Err(RetryStop::Cancelled) => {
                    warn!(region = %region, "search cancelled");
                    return Err(SearchError::Cancelled);
                }
                Err(RetryStop::Failed(e)) if e.is_region_independent() => {
                    error!(region = %region, error = %e, "failure no other region can fix, stopping");
                    return Err(SearchError::Unrecoverable {
                        region: region.clone(),
                        source: e,
                    });
                }
                Err(RetryStop::Failed(e)) => {
                    if i + 1 < regions.len() {
                        warn!(region = %region, error = %e, "query failed, trying next region");
                    } else {
                        error!(region = %region, error = %e, "query failed in last region");
                    }
                    failures.push(RegionFailure {
                        region: region.clone(),
                        error: e,
                    });
                }
            }
        }

        Err(SearchError::RegionsExhausted { failures })
    }
}
