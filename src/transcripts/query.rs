use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use super::SearchRequest;
use crate::bigquery::{QueryJob, QueryParameter};
use crate::config::TableNames;

/// Seconds since the epoch of `0001-01-01T00:00:00Z`, the lowest TIMESTAMP BigQuery accepts.
const TIMESTAMP_FLOOR_SECS: i64 = -62_135_596_800;

fn timestamp_floor() -> DateTime<Utc> {
    DateTime::from_timestamp(TIMESTAMP_FLOOR_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Earliest `created_at` included in the search window.
///
/// `days_back == 0` means "today only": the window opens at the start of the current UTC day.
/// Windows reaching past year 1 are clamped to the TIMESTAMP floor, i.e. all history.
pub fn window_start(now: DateTime<Utc>, days_back: u32) -> DateTime<Utc> {
    if days_back == 0 {
        return now.date_naive().and_time(NaiveTime::MIN).and_utc();
    }
    let floor = timestamp_floor();
    now.checked_sub_signed(TimeDelta::days(i64::from(days_back)))
        .map_or(floor, |start| start.max(floor))
}

/// Standard SQL for `term_count` bound terms; with no terms every row in the window matches.
fn search_sql(tables: &TableNames, term_count: usize) -> String {
    let term_filter = if term_count == 0 {
        String::new()
    } else {
        let any_term = (0..term_count)
            .map(|i| format!("STRPOS(LOWER(t.transcript_text), LOWER(@term_{i})) > 0"))
            .collect::<Vec<_>>()
            .join("\n    OR ");
        format!("\nAND (\n    {any_term}\n)")
    };

    format!(
        "SELECT
    t.created_at,
    t.transcript_text,
    t.call_uuid,
    t.duration_seconds,
    c.opportunity_id,
    c.account_name,
    c.owner_name
FROM `{transcripts}` t
LEFT JOIN `{conversations}` c
ON t.call_uuid = c.call_uuid
WHERE t.created_at >= @since{term_filter}
ORDER BY t.created_at DESC
LIMIT @result_limit",
        transcripts = tables.transcripts,
        conversations = tables.conversations,
    )
}

/// Build the parameterized search job. Search terms, window start, and limit are bound
/// parameters; only the validated table names are interpolated.
pub fn build_query(
    request: &SearchRequest,
    tables: &TableNames,
    job_label: &str,
    now: DateTime<Utc>,
) -> QueryJob {
    let sql = search_sql(tables, request.terms().len());

    let mut parameters = vec![QueryParameter::timestamp(
        "since",
        window_start(now, request.days_back()),
    )];
    parameters.extend(
        request
            .terms()
            .iter()
            .enumerate()
            .map(|(i, term)| QueryParameter::string(&format!("term_{i}"), term)),
    );
    parameters.push(QueryParameter::int64(
        "result_limit",
        i64::from(request.result_limit()),
    ));

    QueryJob {
        sql,
        parameters,
        labels: BTreeMap::from([("purpose".to_string(), job_label.to_string())]),
        max_results: request.result_limit(),
    }
}
