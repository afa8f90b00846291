//! Prometheus metrics for the ticket workflow.
//!
//! Counters are recorded through the `metrics` facade everywhere; nothing is exported until
//! [`MetricsServer::start`] installs the Prometheus recorder. Without it every call is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticketdesk_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Transitions committed, labelled by action.
pub const TRANSITIONS: &str = "ticketdesk.transitions";
/// Transition latency, labelled by action.
pub const TRANSITION_DURATION: &str = "ticketdesk.transition.duration_seconds";
/// Transitions refused by the engine, labelled by reason.
pub const REJECTIONS: &str = "ticketdesk.rejections";
/// Events refused by a router gate, labelled by gate.
pub const GATE_REJECTIONS: &str = "ticketdesk.gate.rejections";
/// Optimistic commits that lost a race and were retried.
pub const COMMIT_CONFLICTS: &str = "ticketdesk.commit.conflicts";
/// Direct messages that could not be delivered.
pub const DM_FAILURES: &str = "ticketdesk.dm.failures";
/// Dispatched effects that failed, labelled by effect kind.
pub const EFFECTS_FAILED: &str = "ticketdesk.effects.failed";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics, install the recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a different recorder is installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Err(MetricsError::Install(e.to_string()))
            }
        }
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(TRANSITIONS, "Lifecycle transitions committed");
    describe_histogram!(
        TRANSITION_DURATION,
        "Time from reading a ticket to finishing its effects"
    );
    describe_counter!(REJECTIONS, "Lifecycle transitions refused by a guard");
    describe_counter!(GATE_REJECTIONS, "Inbound events refused by a router gate");
    describe_counter!(
        COMMIT_CONFLICTS,
        "Optimistic commits retried after a version conflict"
    );
    describe_counter!(DM_FAILURES, "Direct messages that could not be delivered");
    describe_counter!(EFFECTS_FAILED, "Dispatched effects that failed");
}

/// Lifecycle transition recorder.
pub struct TransitionMetrics;

impl TransitionMetrics {
    /// Record a committed transition.
    pub fn record(action: &'static str, duration: Duration) {
        counter!(TRANSITIONS, "action" => action).increment(1);
        histogram!(TRANSITION_DURATION, "action" => action).record(duration.as_secs_f64());
    }

    /// Record a refused transition.
    pub fn record_rejection(reason: &'static str) {
        counter!(REJECTIONS, "reason" => reason).increment(1);
    }

    /// Record a commit that lost a version race.
    pub fn record_conflict() {
        counter!(COMMIT_CONFLICTS).increment(1);
    }
}

/// Router gate recorder.
pub struct GateMetrics;

impl GateMetrics {
    /// Record an event refused by `gate`.
    pub fn record_rejection(gate: &'static str) {
        counter!(GATE_REJECTIONS, "gate" => gate).increment(1);
    }
}

/// Effect dispatch recorder.
pub struct EffectMetrics;

impl EffectMetrics {
    /// Record a failed effect of the given kind.
    pub fn record_failure(kind: &'static str) {
        counter!(EFFECTS_FAILED, "kind" => kind).increment(1);
    }

    /// Record an undeliverable direct message.
    pub fn record_dm_failure() {
        counter!(DM_FAILURES).increment(1);
    }
}
