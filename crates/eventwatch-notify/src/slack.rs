//! Slack incoming-webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use eventwatch_core::{AlertEvent, Severity};

use crate::notifier::{NotifyError, Notifier};
use crate::webhook::{display_value, post_json};

pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, alert: &AlertEvent) -> bool {
        let body = payload(alert, Utc::now());
        post_json(&self.http, self.name(), &self.webhook_url, &body).await
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

fn color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "good",
        Severity::Warning => "warning",
        Severity::Error => "danger",
    }
}

/// Build the attachment payload for one alert.
pub fn payload(alert: &AlertEvent, sent_at: DateTime<Utc>) -> Value {
    let mut fields = Vec::new();
    if let Some(function) = &alert.function {
        fields.push(json!({ "title": "function", "value": function, "short": true }));
    }
    fields.push(json!({ "title": "severity", "value": alert.severity.as_str(), "short": true }));

    let mut context: Vec<(&String, &Value)> = alert.context.iter().collect();
    context.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in context {
        fields.push(json!({ "title": key, "value": display_value(value), "short": true }));
    }

    json!({
        "text": format!("[{}] {}", alert.severity.as_str().to_uppercase(), alert.message),
        "attachments": [{
            "color": color(alert.severity),
            "title": format!("eventwatch {} alert", alert.severity),
            "text": alert.message,
            "fields": fields,
            "ts": sent_at.timestamp(),
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;

    fn sample() -> AlertEvent {
        AlertEvent::new(Severity::Error, "DCP backlog size exceeds threshold")
            .for_function("orders")
            .with_context("threshold", 1000)
            .with_context("backlog_size", 1500)
    }

    #[test]
    fn payload_carries_severity_and_context() {
        let sent_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let body = payload(&sample(), sent_at);

        assert_eq!(body["text"], "[ERROR] DCP backlog size exceeds threshold");
        let attachment = &body["attachments"][0];
        assert_eq!(attachment["color"], "danger");
        assert_eq!(attachment["ts"], 1_700_000_000);

        let fields = attachment["fields"].as_array().unwrap();
        let titles: Vec<&str> = fields.iter().map(|f| f["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["function", "severity", "backlog_size", "threshold"]);
        assert_eq!(fields[0]["value"], "orders");
        assert_eq!(fields[2]["value"], "1500");
    }

    #[test]
    fn process_level_alert_has_no_function_field() {
        let alert = AlertEvent::new(Severity::Info, "watcher started");
        let body = payload(&alert, Utc::now());
        let fields = body["attachments"][0]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(body["attachments"][0]["color"], "good");
    }

    async fn serve(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    move |State(seen): State<Arc<Mutex<Vec<Value>>>>, axum::Json(v): axum::Json<Value>| async move {
                        seen.lock().unwrap().push(v);
                        status
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/hook"), received)
    }

    #[tokio::test]
    async fn send_posts_to_webhook() {
        let (url, received) = serve(StatusCode::OK).await;
        let notifier = SlackNotifier::new(&url, Duration::from_secs(2)).unwrap();

        assert!(notifier.send(&sample()).await);
        let seen = received.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["attachments"][0]["text"], "DCP backlog size exceeds threshold");
    }

    #[tokio::test]
    async fn rejected_webhook_returns_false() {
        let (url, _) = serve(StatusCode::BAD_REQUEST).await;
        let notifier = SlackNotifier::new(&url, Duration::from_secs(2)).unwrap();
        assert!(!notifier.send(&sample()).await);
    }

    #[tokio::test]
    async fn unreachable_webhook_returns_false() {
        let notifier = SlackNotifier::new("http://127.0.0.1:1/hook", Duration::from_secs(1)).unwrap();
        assert!(!notifier.send(&sample()).await);
    }
}
