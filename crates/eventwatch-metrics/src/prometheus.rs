//! Prometheus text exposition format.

use std::fmt::Write as _;

use eventwatch_core::StatusCategory;

use crate::collector::MetricsSnapshot;

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

/// Escape a label value: backslash, double quote and newline.
fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Render a metrics snapshot into Prometheus text format.
///
/// Per-function gauges carry a `function` label; the status gauge is a
/// one-hot encoding over every status category.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    counter(
        &mut out,
        "eventwatch_passes_total",
        "Reconciliation passes completed.",
        snapshot.passes_total,
    );
    counter(
        &mut out,
        "eventwatch_passes_skipped_total",
        "Scheduled ticks skipped because a pass was still running.",
        snapshot.passes_skipped_total,
    );
    counter(
        &mut out,
        "eventwatch_enumeration_failures_total",
        "Passes aborted because the function list could not be fetched.",
        snapshot.enumeration_failures_total,
    );
    counter(
        &mut out,
        "eventwatch_check_errors_total",
        "Per-function stats fetch failures.",
        snapshot.check_errors_total,
    );
    counter(
        &mut out,
        "eventwatch_store_errors_total",
        "Status store read/write failures.",
        snapshot.store_errors_total,
    );
    counter(
        &mut out,
        "eventwatch_transitions_total",
        "Status transitions detected.",
        snapshot.transitions_total,
    );
    counter(
        &mut out,
        "eventwatch_alert_failures_total",
        "Alerts the notifier failed to deliver.",
        snapshot.alert_failures_total,
    );

    out.push_str("# HELP eventwatch_last_pass_duration_ms Duration of the last completed pass.\n");
    out.push_str("# TYPE eventwatch_last_pass_duration_ms gauge\n");
    let _ = writeln!(
        out,
        "eventwatch_last_pass_duration_ms {}",
        snapshot.last_pass_duration_ms
    );

    out.push_str("# HELP eventwatch_breaches_total Threshold breaches detected, by kind.\n");
    out.push_str("# TYPE eventwatch_breaches_total counter\n");
    for (kind, count) in &snapshot.breaches_total {
        let kind = escape_label(kind);
        let _ = writeln!(out, "eventwatch_breaches_total{{kind=\"{kind}\"}} {count}");
    }

    out.push_str("# HELP eventwatch_function_backlog Pending change-feed items per function.\n");
    out.push_str("# TYPE eventwatch_function_backlog gauge\n");
    for (name, gauges) in &snapshot.functions {
        if let Some(backlog) = gauges.backlog {
            let name = escape_label(name);
            let _ = writeln!(out, "eventwatch_function_backlog{{function=\"{name}\"}} {backlog}");
        }
    }

    out.push_str("# HELP eventwatch_function_breaches Active breaches per function.\n");
    out.push_str("# TYPE eventwatch_function_breaches gauge\n");
    for (name, gauges) in &snapshot.functions {
        let name = escape_label(name);
        let _ = writeln!(
            out,
            "eventwatch_function_breaches{{function=\"{name}\"}} {}",
            gauges.breaches
        );
    }

    out.push_str("# HELP eventwatch_function_status Current lifecycle status per function (1 = active).\n");
    out.push_str("# TYPE eventwatch_function_status gauge\n");
    for (name, gauges) in &snapshot.functions {
        let name = escape_label(name);
        for category in StatusCategory::ALL {
            let value = u8::from(gauges.status == category);
            let _ = writeln!(
                out,
                "eventwatch_function_status{{function=\"{name}\",status=\"{category}\"}} {value}"
            );
        }
    }

    out
}
