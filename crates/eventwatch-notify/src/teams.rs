//! Microsoft Teams connector transport (MessageCard format).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use eventwatch_core::{AlertEvent, Severity};

use crate::notifier::{NotifyError, Notifier};
use crate::webhook::{display_value, post_json};

pub struct TeamsNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    async fn send(&self, alert: &AlertEvent) -> bool {
        post_json(&self.http, self.name(), &self.webhook_url, &payload(alert)).await
    }

    fn name(&self) -> &'static str {
        "teams"
    }
}

fn theme_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "2EB886",
        Severity::Warning => "DAA038",
        Severity::Error => "A30200",
    }
}

/// Build the MessageCard for one alert.
pub fn payload(alert: &AlertEvent) -> Value {
    let mut facts = Vec::new();
    if let Some(function) = &alert.function {
        facts.push(json!({ "name": "function", "value": function }));
    }
    facts.push(json!({ "name": "severity", "value": alert.severity.as_str() }));

    let mut context: Vec<(&String, &Value)> = alert.context.iter().collect();
    context.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in context {
        facts.push(json!({ "name": key, "value": display_value(value) }));
    }

    let title = match &alert.function {
        Some(function) => format!("eventwatch {}: {}", alert.severity, function),
        None => format!("eventwatch {}", alert.severity),
    };

    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": theme_color(alert.severity),
        "summary": alert.message,
        "title": title,
        "sections": [{
            "activityTitle": alert.message,
            "facts": facts,
            "text": alert.message,
        }]
    })
}
