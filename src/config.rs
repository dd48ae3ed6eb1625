//! Settings loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::bigquery::API_BASE;
use crate::transcripts::retry::{DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

const DEFAULT_TRANSCRIPTS_TABLE: &str = "shopify-dw.raw_salesloft.transcriptions";
const DEFAULT_CONVERSATIONS_TABLE: &str = "shopify-dw.raw_salesloft.conversations";
pub const DEFAULT_REGION: &str = "US";
const DEFAULT_FALLBACK_REGIONS: &str = "US,US-CENTRAL1,EU,NA";
const DEFAULT_JOB_LABEL: &str = "transcript_search";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("BIGQUERY_PROJECT not set (GOOGLE_CLOUD_PROJECT is also accepted)")]
    ProjectNotSet,

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Fully qualified `project.dataset.table` names interpolated into the search SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub transcripts: String,
    pub conversations: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Project that owns (and is billed for) the query jobs.
    pub project: String,
    pub tables: TableNames,
    /// Sentinel region: selecting it expands to `fallback_regions`.
    pub default_region: String,
    pub fallback_regions: Vec<String>,
    pub retry: RetryPolicy,
    /// Value of the `purpose` label attached to every job.
    pub job_label: String,
    pub api_base: String,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// - `BIGQUERY_PROJECT` / `GOOGLE_CLOUD_PROJECT`: required
    /// - `TRANSCRIPTS_TABLE`, `CONVERSATIONS_TABLE`: source tables
    /// - `TRANSCRIPT_DEFAULT_REGION`, `TRANSCRIPT_FALLBACK_REGIONS`: region chain
    /// - `TRANSCRIPT_MAX_ATTEMPTS`, `TRANSCRIPT_ATTEMPT_TIMEOUT_SECS`: retry policy
    /// - `TRANSCRIPT_JOB_LABEL`, `BIGQUERY_API_BASE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let project = get("BIGQUERY_PROJECT")
            .or_else(|| get("GOOGLE_CLOUD_PROJECT"))
            .ok_or(ConfigError::ProjectNotSet)?;

        let tables = TableNames {
            transcripts: table_name(
                "TRANSCRIPTS_TABLE",
                get("TRANSCRIPTS_TABLE").unwrap_or_else(|| DEFAULT_TRANSCRIPTS_TABLE.into()),
            )?,
            conversations: table_name(
                "CONVERSATIONS_TABLE",
                get("CONVERSATIONS_TABLE").unwrap_or_else(|| DEFAULT_CONVERSATIONS_TABLE.into()),
            )?,
        };

        let default_region =
            get("TRANSCRIPT_DEFAULT_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let fallback_regions = parse_regions(
            &get("TRANSCRIPT_FALLBACK_REGIONS").unwrap_or_else(|| DEFAULT_FALLBACK_REGIONS.into()),
        )?;

        let max_attempts = match get("TRANSCRIPT_MAX_ATTEMPTS") {
            Some(v) => {
                let n = parse_positive("TRANSCRIPT_MAX_ATTEMPTS", &v)?;
                u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
                    var: "TRANSCRIPT_MAX_ATTEMPTS",
                    reason: format!("must be at most {}, got '{v}'", u32::MAX),
                })?
            }
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let attempt_timeout = match get("TRANSCRIPT_ATTEMPT_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_positive("TRANSCRIPT_ATTEMPT_TIMEOUT_SECS", &v)?),
            None => DEFAULT_ATTEMPT_TIMEOUT,
        };

        let api_base = get("BIGQUERY_API_BASE").unwrap_or_else(|| API_BASE.to_string());
        url::Url::parse(&api_base).map_err(|e| ConfigError::InvalidValue {
            var: "BIGQUERY_API_BASE",
            reason: e.to_string(),
        })?;

        Ok(Self {
            project,
            tables,
            default_region,
            fallback_regions,
            retry: RetryPolicy {
                max_attempts,
                attempt_timeout,
                ..RetryPolicy::default()
            },
            job_label: get("TRANSCRIPT_JOB_LABEL").unwrap_or_else(|| DEFAULT_JOB_LABEL.into()),
            api_base,
        })
    }
}

/// Table names cannot be bound as query parameters, so they are restricted to
/// `project.dataset.table` with `[A-Za-z0-9_-]` segments.
fn table_name(var: &'static str, value: String) -> Result<String, ConfigError> {
    let segments: Vec<&str> = value.split('.').collect();
    let valid = segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        });
    if !valid {
        return Err(ConfigError::InvalidValue {
            var,
            reason: format!("expected 'project.dataset.table', got '{value}'"),
        });
    }
    Ok(value)
}

fn parse_regions(raw: &str) -> Result<Vec<String>, ConfigError> {
    let regions: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect();
    if regions.is_empty() {
        return Err(ConfigError::InvalidValue {
            var: "TRANSCRIPT_FALLBACK_REGIONS",
            reason: "must list at least one region".into(),
        });
    }
    Ok(regions)
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            var,
            reason: format!("expected a positive integer, got '{value}'"),
        }),
    }
}
