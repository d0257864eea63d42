//! The notifier contract and transport selection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use eventwatch_core::config::AlertsConfig;
use eventwatch_core::{AlertEvent, AlertTransport};

use crate::slack::SlackNotifier;
use crate::teams::TeamsNotifier;

/// Timeout for a single webhook POST.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers alerts through one transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one alert. Returns `true` when delivered; failures are logged
    /// by the implementation and reported as `false`.
    async fn send(&self, alert: &AlertEvent) -> bool;

    /// Short transport name for logs.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("unknown alert transport selector {0}")]
    UnknownTransport(u8),

    #[error("alert transport {0} requires a webhook_url")]
    MissingWebhook(&'static str),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Transport used when alerting is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, alert: &AlertEvent) -> bool {
        debug!(
            severity = %alert.severity,
            function = alert.function.as_deref().unwrap_or("-"),
            message = %alert.message,
            "alert dropped (no transport configured)"
        );
        true
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the notifier selected by `[alerts]`.
pub fn build_notifier(config: &AlertsConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let transport = config
        .transport()
        .ok_or(NotifyError::UnknownTransport(config.transport))?;

    let notifier: Arc<dyn Notifier> = match transport {
        AlertTransport::None => Arc::new(NullNotifier),
        AlertTransport::Slack => {
            let url = webhook_url(config, "slack")?;
            Arc::new(SlackNotifier::new(url, WEBHOOK_TIMEOUT)?)
        }
        AlertTransport::Teams => {
            let url = webhook_url(config, "teams")?;
            Arc::new(TeamsNotifier::new(url, WEBHOOK_TIMEOUT)?)
        }
    };

    info!(transport = notifier.name(), "alert notifier configured");
    Ok(notifier)
}

fn webhook_url<'a>(config: &'a AlertsConfig, name: &'static str) -> Result<&'a str, NotifyError> {
    config
        .webhook_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or(NotifyError::MissingWebhook(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventwatch_core::Severity;

    fn alerts(transport: u8, webhook_url: Option<&str>) -> AlertsConfig {
        AlertsConfig {
            transport,
            webhook_url: webhook_url.map(str::to_string),
        }
    }

    #[test]
    fn selector_picks_transport() {
        let url = Some("http://127.0.0.1:9/hook");
        assert_eq!(build_notifier(&alerts(0, None)).unwrap().name(), "none");
        assert_eq!(build_notifier(&alerts(1, url)).unwrap().name(), "slack");
        assert_eq!(build_notifier(&alerts(2, url)).unwrap().name(), "teams");
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let err = build_notifier(&alerts(3, None)).err().unwrap();
        assert!(matches!(err, NotifyError::UnknownTransport(3)));
    }

    #[test]
    fn webhook_transports_need_url() {
        let err = build_notifier(&alerts(1, Some(""))).err().unwrap();
        assert!(matches!(err, NotifyError::MissingWebhook("slack")));
        let err = build_notifier(&alerts(2, None)).err().unwrap();
        assert!(matches!(err, NotifyError::MissingWebhook("teams")));
    }

    #[tokio::test]
    async fn null_notifier_always_delivers() {
        let alert = AlertEvent::new(Severity::Error, "boom");
        assert!(NullNotifier.send(&alert).await);
    }
}
