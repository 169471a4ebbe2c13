use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};
use tern_core::ReportedError;
use tern_model::{JobPhase, JobStatus};

/// Job metrics kept in a private registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    transitions: IntCounterVec,
    finished: IntCounterVec,
    duration: Histogram,
    errors: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tern".to_string()), None)?;

        let transitions = IntCounterVec::new(
            Opts::new("job_transitions_total", "Job status transitions by phase"),
            &["phase"],
        )?;
        let finished = IntCounterVec::new(
            Opts::new("jobs_finished_total", "Finished jobs by outcome"),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new("job_duration_seconds", "Wall time from creation to finish")
                .buckets(vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )?;
        let errors = IntCounterVec::new(
            Opts::new("reported_errors_total", "Background failures by kind"),
            &["kind"],
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            transitions,
            finished,
            duration,
            errors,
        })
    }

    /// Count one published status.
    pub fn observe(&self, status: &JobStatus) {
        self.transitions
            .with_label_values(&[status.phase.as_str()])
            .inc();
        if status.phase != JobPhase::Done {
            return;
        }

        let outcome = if status.conditions.success {
            "success"
        } else {
            "failure"
        };
        self.finished.with_label_values(&[outcome]).inc();

        if let Some(finished) = status.metadata.finished
            && let Ok(took) = finished.duration_since(status.metadata.created)
        {
            self.duration.observe(took.as_secs_f64());
        }
    }

    pub fn record_error(&self, err: &ReportedError) {
        let kind = match err {
            ReportedError::Persistence { .. } => "persistence",
            ReportedError::Notification { .. } => "notification",
            ReportedError::WatchDisconnected { .. } => "watch_disconnected",
            ReportedError::LogForwarding { .. } => "log_forwarding",
        };
        self.errors.with_label_values(&[kind]).inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, ready to serve on `/metrics`.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tern_model::{JobMetadata, Trigger};

    fn status(phase: JobPhase) -> JobStatus {
        JobStatus::new("job.0", JobMetadata::new("alice", Trigger::Manual)).with_phase(phase)
    }

    #[test]
    fn counts_transitions_and_outcomes() {
        let m = PrometheusMetrics::new().unwrap();
        m.observe(&status(JobPhase::Running));
        m.observe(&status(JobPhase::Running));

        let mut done = status(JobPhase::Done);
        done.conditions.success = true;
        done.metadata.finished = Some(done.metadata.created + Duration::from_secs(42));
        m.observe(&done);
        m.observe(&JobStatus::failed("job.1", JobMetadata::default(), "boom"));

        assert_eq!(m.transitions.with_label_values(&["running"]).get(), 2);
        assert_eq!(m.transitions.with_label_values(&["done"]).get(), 2);
        assert_eq!(m.finished.with_label_values(&["success"]).get(), 1);
        assert_eq!(m.finished.with_label_values(&["failure"]).get(), 1);
        assert_eq!(m.duration.get_sample_count(), 1);
        assert_eq!(m.duration.get_sample_sum(), 42.0);
    }

    #[test]
    fn encodes_with_namespace() {
        let m = PrometheusMetrics::new().unwrap();
        m.record_error(&ReportedError::WatchDisconnected {
            attempts: 5,
            reason: "eof".into(),
        });
        m.observe(&status(JobPhase::Preparing));

        let text = m.encode().unwrap();
        assert!(text.contains(r#"tern_reported_errors_total{kind="watch_disconnected"} 1"#));
        assert!(text.contains(r#"tern_job_transitions_total{phase="preparing"} 1"#));
    }
}
