//! BigQuery REST client: `jobs.query` with result polling and paging, plus error classification.

pub mod auth;
pub mod types;

pub use types::{QueryParameter, ResultSet, Row};

use std::collections::BTreeMap;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use tracing::{debug, warn};

use auth::AccessToken;
use types::{
    ApiError, ErrorDetail, ErrorEnvelope, FormatOptions, JobReference, QueryRequest, QueryResponse,
    TableSchema, zip_rows,
};

pub const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
/// How long the server may hold a `jobs.query` / `getQueryResults` call open.
const SERVER_WAIT_MS: u64 = 10_000;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Everything but RFC 3986 unreserved characters is encoded in path and query values.
const COMPONENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, thiserror::Error)]
pub enum BigQueryError {
    #[error(
        "no BigQuery access token found. Set BIGQUERY_ACCESS_TOKEN or run `gcloud auth login`"
    )]
    AuthMissing,

    #[error("authentication rejected: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("BigQuery rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("BigQuery API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("query attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl BigQueryError {
    /// Whether retrying the same call in the same region may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BigQueryError::RateLimited(_)
            | BigQueryError::Api {
                code: 500..=599, ..
            }
            | BigQueryError::Timeout(_) => true,
            BigQueryError::Network(e) => !e.is_decode(),
            _ => false,
        }
    }

    /// Errors that no other region can fix: credentials are global and a rejected
    /// query is rejected everywhere.
    pub fn is_region_independent(&self) -> bool {
        matches!(
            self,
            BigQueryError::AuthMissing
                | BigQueryError::Unauthorized(_)
                | BigQueryError::InvalidQuery(_)
        )
    }
}

/// A parameterized standard-SQL query ready to be submitted in some region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
    pub labels: BTreeMap<String, String>,
    pub max_results: u32,
}

/// Abstraction over the remote tabular query service.
/// Implemented by `BigQueryClient` for production; mock implementations used in tests.
pub trait QueryService {
    async fn run_query(&self, job: &QueryJob, region: &str) -> Result<ResultSet, BigQueryError>;
}

#[derive(Clone)]
pub struct BigQueryClient {
    http: Client,
    token: Option<AccessToken>,
    project: String,
    base_url: String,
}

impl BigQueryClient {
    pub fn new(http: Client, token: Option<AccessToken>, project: &str, base_url: &str) -> Self {
        if token.is_none() {
            warn!("No BigQuery access token found. Queries will fail until one is configured.");
        }
        Self {
            http,
            token,
            project: project.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            token: Some(AccessToken::new("test-token")),
            project: "test-project".to_string(),
            base_url: base_url.to_string(),
        }
    }

    async fn start_query(
        &self,
        token: &AccessToken,
        job: &QueryJob,
        region: &str,
    ) -> Result<QueryResponse, BigQueryError> {
        let url = format!("{}/projects/{}/queries", self.base_url, encode(&self.project));
        let request = QueryRequest {
            query: &job.sql,
            use_legacy_sql: false,
            use_query_cache: true,
            location: region,
            labels: &job.labels,
            max_results: job.max_results,
            timeout_ms: SERVER_WAIT_MS,
            parameter_mode: "NAMED",
            query_parameters: &job.parameters,
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        };

        debug_assert!(
            url.starts_with("https://") || cfg!(test),
            "access token must only be sent over HTTPS"
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", token.bearer())
            .header("User-Agent", crate::USER_AGENT)
            .json(&request)
            .send()
            .await?;
        read_response(response).await
    }

    async fn get_query_results(
        &self,
        token: &AccessToken,
        job: &JobReference,
        region: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<QueryResponse, BigQueryError> {
        let location = job.location.as_deref().unwrap_or(region);
        let mut url = format!(
            "{}/projects/{}/queries/{}?location={}&maxResults={max_results}&timeoutMs={SERVER_WAIT_MS}&formatOptions.useInt64Timestamp=true",
            self.base_url,
            encode(&job.project_id),
            encode(&job.job_id),
            encode(location),
        );
        if let Some(page_token) = page_token {
            url.push_str(&format!("&pageToken={}", encode(page_token)));
        }

        let response = self
            .http
            .get(&url)
            .header("Authorization", token.bearer())
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;
        read_response(response).await
    }
}

impl QueryService for BigQueryClient {
    async fn run_query(&self, job: &QueryJob, region: &str) -> Result<ResultSet, BigQueryError> {
        let token = self.token.as_ref().ok_or(BigQueryError::AuthMissing)?;
        let mut page = self.start_query(token, job, region).await?;
        let mut schema: Option<TableSchema> = None;
        let mut rows = Vec::new();

        loop {
            let page_token = if page.job_complete {
                if schema.is_none() {
                    schema = page.schema.take();
                }
                if let Some(page_rows) = page.rows.take() {
                    let schema = schema
                        .as_ref()
                        .ok_or_else(|| BigQueryError::Malformed("rows without schema".into()))?;
                    rows.extend(zip_rows(schema, page_rows));
                }
                match page.page_token.take() {
                    Some(t) if rows.len() < job.max_results as usize => Some(t),
                    _ => break,
                }
            } else {
                debug!(region, "job still running, polling for results");
                tokio::time::sleep(POLL_INTERVAL).await;
                None
            };

            let reference = page.job_reference.take().ok_or_else(|| {
                BigQueryError::Malformed("response is missing jobReference".into())
            })?;
            page = self
                .get_query_results(token, &reference, region, page_token.as_deref(), job.max_results)
                .await?;
        }

        debug!(region, rows = rows.len(), "query complete");
        Ok(ResultSet { rows })
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT_ENCODE_SET).to_string()
}

async fn read_response(response: reqwest::Response) -> Result<QueryResponse, BigQueryError> {
    let status = response.status();
    if status.is_success() {
        let body: QueryResponse = response.json().await?;
        if let Some(err) = &body.error {
            let classified = classify_api_error(status.as_u16(), err);
            warn!(error = %classified, "BigQuery error in 200 response");
            return Err(classified);
        }
        return Ok(body);
    }

    let text = response.text().await.unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&text) {
        let classified = classify_api_error(status.as_u16(), &envelope.error);
        warn!(error = %classified, "BigQuery API error");
        return Err(classified);
    }
    let snippet: String = text.chars().take(200).collect();
    warn!(status = %status, "BigQuery API error (no structured body)");
    Err(classify(status.as_u16(), format!("HTTP {status}: {snippet}"), &[]))
}

fn classify_api_error(status: u16, err: &ApiError) -> BigQueryError {
    let message = err
        .message
        .clone()
        .or_else(|| err.status.clone())
        .unwrap_or_else(|| "Unknown error".to_string());
    classify(err.code.unwrap_or(status), message, &err.errors)
}

fn classify(code: u16, message: String, details: &[ErrorDetail]) -> BigQueryError {
    let quota = details
        .iter()
        .filter_map(|d| d.reason.as_deref())
        .any(|r| matches!(r, "rateLimitExceeded" | "quotaExceeded"));

    match code {
        429 => BigQueryError::RateLimited(message),
        403 if quota => BigQueryError::RateLimited(message),
        401 => BigQueryError::Unauthorized(message),
        403 => BigQueryError::PermissionDenied(message),
        404 => BigQueryError::NotFound(message),
        400 => BigQueryError::InvalidQuery(message),
        code => BigQueryError::Api { code, message },
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job() -> QueryJob {
        QueryJob {
            sql: "SELECT 1".into(),
            parameters: vec![QueryParameter::string("term_0", "bigcommerce")],
            labels: BTreeMap::from([("purpose".to_string(), "transcript_search".to_string())]),
            max_results: 10,
        }
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({"fields": [{"name": "account_name"}, {"name": "owner_name"}]})
    }

    #[tokio::test]
    async fn run_query_sends_location_cache_and_labels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "location": "EU",
                "useQueryCache": true,
                "useLegacySql": false,
                "parameterMode": "NAMED",
                "maxResults": 10,
                "labels": {"purpose": "transcript_search"},
                "queryParameters": [{
                    "name": "term_0",
                    "parameterType": {"type": "STRING"},
                    "parameterValue": {"value": "bigcommerce"}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "jobReference": {"projectId": "test-project", "jobId": "job-1", "location": "EU"},
                "schema": schema(),
                "rows": [
                    {"f": [{"v": "Acme"}, {"v": "Dana"}]},
                    {"f": [{"v": "Globex"}, {"v": null}]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(Client::new(), &server.uri());
        let result = client.run_query(&job(), "EU").await.unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].get("account_name"), Some("Acme"));
        assert_eq!(result.rows[1].get("owner_name"), None);
    }

    #[tokio::test]
    async fn run_query_polls_until_job_complete_then_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": false,
                "jobReference": {"projectId": "test-project", "jobId": "job-1", "location": "US"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/test-project/queries/job-1"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "jobReference": {"projectId": "test-project", "jobId": "job-1", "location": "US"},
                "schema": schema(),
                "rows": [{"f": [{"v": "Second"}, {"v": "Bo"}]}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/test-project/queries/job-1"))
            .and(query_param("location", "US"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "jobReference": {"projectId": "test-project", "jobId": "job-1", "location": "US"},
                "schema": schema(),
                "pageToken": "page-2",
                "rows": [{"f": [{"v": "First"}, {"v": "Al"}]}]
            })))
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(Client::new(), &server.uri());
        let result = client.run_query(&job(), "US").await.unwrap();

        let accounts: Vec<_> = result
            .rows
            .iter()
            .map(|r| r.get("account_name").unwrap())
            .collect();
        assert_eq!(accounts, ["First", "Second"]);
    }

    #[tokio::test]
    async fn run_query_404_returns_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {
                    "code": 404,
                    "message": "Not found: Dataset shopify-dw:raw_salesloft was not found in location EU",
                    "errors": [{"reason": "notFound"}],
                    "status": "NOT_FOUND"
                }
            })))
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(Client::new(), &server.uri());
        let result = client.run_query(&job(), "EU").await;
        assert!(matches!(result, Err(BigQueryError::NotFound(ref m)) if m.contains("location EU")));
    }

    #[tokio::test]
    async fn run_query_500_without_body_returns_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/test-project/queries"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = BigQueryClient::with_base_url(Client::new(), &server.uri());
        match client.run_query(&job(), "US").await {
            Err(BigQueryError::Api { code: 500, message }) => {
                assert!(message.contains("not json"), "got: {message}");
            }
            other => panic!("expected Api(500), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_query_without_token_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = BigQueryClient {
            http: Client::new(),
            token: None,
            project: "test-project".into(),
            base_url: server.uri(),
        };
        let result = client.run_query(&job(), "US").await;
        assert!(matches!(result, Err(BigQueryError::AuthMissing)));
    }
}
