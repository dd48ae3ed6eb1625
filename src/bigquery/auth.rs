use std::env;

use tracing::debug;

const TOKEN_VARS: [&str; 2] = ["BIGQUERY_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

/// OAuth bearer token for the BigQuery REST API.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(super) fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Resolution order: `BIGQUERY_ACCESS_TOKEN` env → `GOOGLE_OAUTH_ACCESS_TOKEN` env
/// → `gcloud auth print-access-token` → none.
pub fn resolve_token() -> Option<AccessToken> {
    TOKEN_VARS
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find_map(non_blank)
        .or_else(gcloud_token)
        .map(AccessToken::new)
}

fn gcloud_token() -> Option<String> {
    let output = std::process::Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .inspect_err(|e| debug!(error = %e, "gcloud not available"))
        .ok()?;
    if !output.status.success() {
        debug!(
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "gcloud auth print-access-token failed"
        );
        return None;
    }
    non_blank(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn non_blank(token: String) -> Option<String> {
    let token = token.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}
