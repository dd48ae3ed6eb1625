use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /projects/{project}/queries` (`jobs.query`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    pub query: &'a str,
    pub use_legacy_sql: bool,
    pub use_query_cache: bool,
    pub location: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub max_results: u32,
    pub timeout_ms: u64,
    pub parameter_mode: &'static str,
    pub query_parameters: &'a [QueryParameter],
    pub format_options: FormatOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    pub use_int64_timestamp: bool,
}

/// A named query parameter bound as `@name` in standard SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: ParameterType,
    pub parameter_value: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterType {
    #[serde(rename = "type")]
    pub type_: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterValue {
    pub value: String,
}

impl QueryParameter {
    fn new(name: &str, type_: &'static str, value: String) -> Self {
        Self {
            name: name.to_string(),
            parameter_type: ParameterType { type_ },
            parameter_value: ParameterValue { value },
        }
    }

    pub fn string(name: &str, value: &str) -> Self {
        Self::new(name, "STRING", value.to_string())
    }

    pub fn int64(name: &str, value: i64) -> Self {
        Self::new(name, "INT64", value.to_string())
    }

    pub fn timestamp(name: &str, value: DateTime<Utc>) -> Self {
        Self::new(
            name,
            "TIMESTAMP",
            value.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string(),
        )
    }
}

/// Shared shape of `jobs.query` and `jobs.getQueryResults` responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub schema: Option<TableSchema>,
    pub job_reference: Option<JobReference>,
    pub rows: Option<Vec<TableRow>>,
    pub page_token: Option<String>,
    #[serde(default)]
    pub job_complete: bool,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
pub struct FieldSchema {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TableRow {
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub struct TableCell {
    pub v: serde_json::Value,
}

impl TableCell {
    fn into_value(self) -> Option<String> {
        match self.v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

/// Error envelope returned by Google APIs.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub reason: Option<String>,
}

/// One result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: HashMap<String, Option<String>>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Option<V>)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        }
    }
}

/// Rows of a completed query, in the order the service returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub rows: Vec<Row>,
}

pub(super) fn zip_rows(schema: &TableSchema, rows: Vec<TableRow>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            schema
                .fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| (field.name.clone(), cell.into_value()))
                .collect::<Row>()
        })
        .collect()
}
