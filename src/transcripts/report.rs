use super::excerpt::{CONTEXT_RADIUS, context_window};
use super::{SearchError, SearchOutcome, TranscriptRecord};
use crate::bigquery::BigQueryError;

const SEPARATOR_WIDTH: usize = 80;
const SUMMARY_ROWS: usize = 5;

fn quote_terms(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn format_duration(seconds: i64) -> String {
    let (h, m, s) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else {
        format!("{m}m {s:02}s")
    }
}

/// One block per record with a context window around the first matching term.
pub fn format_results(outcome: &SearchOutcome, terms: &[String]) -> String {
    let label = if terms.len() == 1 { "term" } else { "terms" };
    let mut out = format!(
        "Results for search {label} {} (location: {}):\n\n",
        quote_terms(terms),
        outcome.region
    );

    if outcome.records.is_empty() {
        out.push_str("No matching transcripts found.\n");
        return out;
    }

    for record in &outcome.records {
        out.push_str(&format!("Date: {}\n", record.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
        out.push_str(&format!("Account: {}\n", or_dash(record.account_name.as_deref())));
        out.push_str(&format!("Owner: {}\n", or_dash(record.owner_name.as_deref())));
        if let Some(call) = &record.call_uuid {
            out.push_str(&format!("Call: {call}\n"));
        }

        let excerpt = context_window(&record.transcript_text, terms, CONTEXT_RADIUS);
        if excerpt.matched {
            out.push_str("Transcript excerpt:\n");
        } else {
            out.push_str("Transcript (search term not located locally, full text):\n");
        }
        out.push_str(&format!("...{}...\n", excerpt.text));
        out.push_str(&"-".repeat(SEPARATOR_WIDTH));
        out.push_str("\n\n");
    }

    out
}

/// Match count, the most recent conversations, and distinct opportunities.
pub fn format_summary(records: &[TranscriptRecord]) -> String {
    if records.is_empty() {
        return "No results to analyze\n".to_string();
    }

    let mut out = format!("Found {} matching transcripts\n\n", records.len());
    out.push_str("Most recent conversations:\n");
    out.push_str("| Created | Account | Owner | Duration |\n|---------|---------|-------|----------|\n");
    for record in records.iter().take(SUMMARY_ROWS) {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            record.created_at.format("%Y-%m-%d %H:%M"),
            or_dash(record.account_name.as_deref()),
            or_dash(record.owner_name.as_deref()),
            record
                .duration_seconds
                .map_or_else(|| "-".to_string(), format_duration),
        ));
    }

    let mut opportunities: Vec<&str> = records
        .iter()
        .filter_map(|r| r.opportunity_id.as_deref())
        .collect();
    if !opportunities.is_empty() {
        opportunities.sort_unstable();
        opportunities.dedup();
        out.push_str(&format!(
            "\nUnique opportunities mentioned: {}\n",
            opportunities.len()
        ));
    }

    out
}

/// User-facing failure text. Remote failures get remediation steps instead of a raw error chain.
pub fn format_failure(error: &SearchError, project: &str) -> String {
    let remediation = |out: &mut String| {
        out.push_str("Please ensure you have:\n");
        out.push_str("1. Proper authentication (run 'gcloud auth application-default login', or set BIGQUERY_ACCESS_TOKEN)\n");
        out.push_str(&format!("2. Access to the {project} project\n"));
        out.push_str("3. Permissions for the transcript and conversation datasets\n");
    };

    match error {
        SearchError::RegionsExhausted { failures } => {
            let mut out = String::from("Error executing query in all locations:\n");
            for failure in failures {
                out.push_str(&format!("- {}: {}\n", failure.region, failure.error));
            }
            out.push('\n');
            remediation(&mut out);
            out
        }
        SearchError::Unrecoverable {
            region,
            source: source @ BigQueryError::InvalidQuery(_),
        } => format!(
            "The search query was rejected in {region}: {source}\n\
             Check that TRANSCRIPTS_TABLE and CONVERSATIONS_TABLE name existing tables with the expected columns.\n"
        ),
        SearchError::Unrecoverable { region, source } => {
            let mut out = format!("Error executing query in {region}: {source}\n\n");
            remediation(&mut out);
            out
        }
        other => format!("Error: {other}\n"),
    }
}
