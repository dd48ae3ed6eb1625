use chrono::{DateTime, Utc};

use crate::bigquery::Row;

/// One matched transcript as returned by the query service. Read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRecord {
    pub created_at: DateTime<Utc>,
    pub transcript_text: String,
    pub account_name: Option<String>,
    pub owner_name: Option<String>,
    pub call_uuid: Option<String>,
    pub duration_seconds: Option<i64>,
    pub opportunity_id: Option<String>,
}

impl TranscriptRecord {
    pub fn from_row(row: &Row) -> Result<Self, String> {
        let created_at = row
            .get("created_at")
            .ok_or_else(|| "created_at is null".to_string())
            .and_then(|raw| {
                parse_timestamp(raw).ok_or_else(|| format!("unparseable created_at '{raw}'"))
            })?;
        let transcript_text = row
            .get("transcript_text")
            .ok_or_else(|| "transcript_text is null".to_string())?
            .to_string();
        let text = |column: &str| row.get(column).map(String::from);

        Ok(Self {
            created_at,
            transcript_text,
            account_name: text("account_name"),
            owner_name: text("owner_name"),
            call_uuid: text("call_uuid"),
            duration_seconds: row
                .get("duration_seconds")
                .and_then(|v| v.parse::<f64>().ok())
                .map(|secs| secs.round() as i64),
            opportunity_id: text("opportunity_id"),
        })
    }
}

/// TIMESTAMP cells arrive as int64 microseconds when `useInt64Timestamp` is honoured,
/// otherwise as float epoch seconds. RFC 3339 is accepted for emulators.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(micros) = raw.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros);
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
