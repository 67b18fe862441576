//! Report sink that writes finished reports to the log

use application::ApplicationError;
use application::ports::{ReportSinkPort, ResilienceReport};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Logs a summary line per report, and the full report at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReportSink {
    /// Scores below this are logged as warnings
    warn_below: u8,
}

impl TracingReportSink {
    pub const fn new() -> Self {
        Self { warn_below: 0 }
    }

    #[must_use]
    pub const fn warn_below(mut self, score: u8) -> Self {
        self.warn_below = score;
        self
    }
}

#[async_trait]
impl ReportSinkPort for TracingReportSink {
    async fn publish(&self, report: &ResilienceReport) -> Result<(), ApplicationError> {
        let failures = report.results.failures.len();
        let status = report.results.status;
        if report.score < self.warn_below {
            warn!(
                experiment_id = %report.experiment_id,
                experiment = %report.experiment_name,
                score = report.score,
                blast_radius = %report.blast_radius.severity,
                failures,
                %status,
                "low resilience score"
            );
        } else {
            info!(
                experiment_id = %report.experiment_id,
                experiment = %report.experiment_name,
                score = report.score,
                blast_radius = %report.blast_radius.severity,
                failures,
                %status,
                "resilience report"
            );
        }

        let body = serde_json::to_string(report)
            .map_err(|e| ApplicationError::Internal(format!("failed to encode report: {e}")))?;
        debug!(report = %body, "full resilience report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use application::{build_report, calculate_resilience_score};
    use chrono::Utc;
    use domain::entities::{Experiment, ExperimentResults, FaultConfig, FaultDefinition, Target};
    use domain::value_objects::ExperimentStatus;

    use super::*;

    #[tokio::test]
    async fn publishes_reports() {
        let exp = Experiment::new("drill", Target::new("service", "api"), Duration::from_secs(60))
            .with_fault(
                FaultDefinition::new("f1", FaultConfig::Unavailability, Duration::from_secs(10))
                    .unwrap(),
            );
        let mut results = ExperimentResults::started(Utc::now());
        results.finish(ExperimentStatus::Completed, Utc::now());
        assert_eq!(calculate_resilience_score(&results), 100);

        let report = build_report(&exp, &results);
        TracingReportSink::new()
            .warn_below(101)
            .publish(&report)
            .await
            .unwrap();
    }
}
