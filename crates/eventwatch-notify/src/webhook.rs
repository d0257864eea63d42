//! Shared webhook POST used by the Slack and Teams transports.

use serde_json::Value;
use tracing::{debug, warn};

/// POST a JSON payload. Returns `true` on any 2xx response.
pub(crate) async fn post_json(
    http: &reqwest::Client,
    transport: &'static str,
    url: &str,
    payload: &Value,
) -> bool {
    match http.post(url).json(payload).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(transport, status = %resp.status(), "alert delivered");
            true
        }
        Ok(resp) => {
            warn!(transport, status = %resp.status(), "alert webhook rejected the payload");
            false
        }
        Err(e) => {
            warn!(transport, error = %e, "alert webhook request failed");
            false
        }
    }
}

/// Render a context value for display; strings lose their JSON quotes.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
