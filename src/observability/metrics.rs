//! Service counters exported in Prometheus format.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use tracing::info;

/// Every metric the relay records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RowsAppended,
    RowsDryRun,
    RowsRejected,
    RateLimited,
    Unauthorized,
    UpstreamFailures,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::RowsAppended,
        MetricName::RowsDryRun,
        MetricName::RowsRejected,
        MetricName::RateLimited,
        MetricName::Unauthorized,
        MetricName::UpstreamFailures,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RowsAppended => "sheets_relay_rows_appended_total",
            MetricName::RowsDryRun => "sheets_relay_rows_dry_run_total",
            MetricName::RowsRejected => "sheets_relay_rows_rejected_total",
            MetricName::RateLimited => "sheets_relay_rate_limited_total",
            MetricName::Unauthorized => "sheets_relay_unauthorized_total",
            MetricName::UpstreamFailures => "sheets_relay_upstream_failures_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn increment(name: MetricName) {
    ::metrics::counter!(name.as_str()).increment(1);
}

/// Install the global Prometheus recorder and return the handle used to render it.
pub fn init() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;

    // register at zero so every series shows up before the first event
    for name in MetricName::ALL {
        ::metrics::counter!(name.as_str()).absolute(0);
    }

    info!("Metrics recorder installed");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prometheus_style() {
        let names: HashSet<_> = MetricName::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::ALL.len());
        for name in names {
            assert!(name.starts_with("sheets_relay_"));
            assert!(name.ends_with("_total"));
        }
    }
}
