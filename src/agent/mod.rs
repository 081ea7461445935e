// Reporting Agent
// Polls runtime statistics and ships them to the aggregator on two timers

pub mod delivery;
pub mod sampler;

pub use delivery::{BackoffSchedule, DeliveryOutcome, HttpTransport, Transport};
pub use sampler::{RuntimeSampler, Sampler};

use crate::config::AgentConfig;
use crate::metrics::Metric;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

/// Counter carrying the number of polls since start
pub const POLL_COUNT: &str = "PollCount";

/// Gauge drawn fresh for every report
pub const RANDOM_VALUE: &str = "RandomValue";

/// Reporter timing and retry settings
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub backoff: BackoffSchedule,
}

impl From<&AgentConfig> for ReporterConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval(),
            backoff: BackoffSchedule::new(config.backoff_schedule()),
        }
    }
}

/// Collector-side state machine
///
/// Polling and reporting share one select loop. Each report cycle runs in
/// its own task, so a hanging delivery stalls only that cycle.
pub struct Reporter<S: Sampler> {
    config: ReporterConfig,
    transport: Arc<dyn Transport>,
    sampler: S,

    /// Polls since the agent started; never reset
    poll_count: i64,

    /// Gauges from the most recent poll
    cached: Vec<Metric>,
}

impl<S: Sampler> Reporter<S> {
    pub fn new(config: ReporterConfig, transport: Arc<dyn Transport>, sampler: S) -> Self {
        Self {
            config,
            transport,
            sampler,
            poll_count: 0,
            cached: Vec::new(),
        }
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// Count a poll and refresh the cached statistics
    pub fn poll(&mut self) {
        self.poll_count += 1;
        self.cached = self.sampler.sample();
        debug!(poll_count = self.poll_count, gauges = self.cached.len(), "Runtime statistics polled");
    }

    /// Assemble everything a report cycle sends
    pub fn batch(&self) -> Vec<Metric> {
        let mut batch = Vec::with_capacity(self.cached.len() + 2);
        batch.push(Metric::counter(POLL_COUNT, self.poll_count));
        batch.push(Metric::gauge(RANDOM_VALUE, rand::random::<f64>()));
        batch.extend(self.cached.iter().cloned());
        batch
    }

    /// Deliver one batch in the background
    fn spawn_report(&self) -> tokio::task::JoinHandle<DeliveryOutcome> {
        let batch = self.batch();
        let transport = self.transport.clone();
        let backoff = self.config.backoff.clone();

        tokio::spawn(async move { report_cycle(transport, batch, backoff).await })
    }

    /// Run until a shutdown notification arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            report_interval_secs = self.config.report_interval.as_secs(),
            max_attempts = self.config.backoff.max_attempts(),
            "Agent started"
        );

        let start = Instant::now();
        let mut poll_ticker = interval_at(start + self.config.poll_interval, self.config.poll_interval);
        let mut report_ticker = interval_at(start + self.config.report_interval, self.config.report_interval);
        poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        report_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Poll first when both fire together so the report sees the fresh sample
                biased;

                _ = poll_ticker.tick() => self.poll(),
                _ = report_ticker.tick() => {
                    info!(poll_count = self.poll_count, "Sending metrics");
                    self.spawn_report();
                }
                _ = shutdown.recv() => break,
            }
        }

        info!(poll_count = self.poll_count, "Agent stopped");
    }
}

/// Deliver every metric of one report, one after another
#[instrument(skip_all, fields(metrics = batch.len()))]
pub async fn report_cycle(
    transport: Arc<dyn Transport>,
    batch: Vec<Metric>,
    backoff: BackoffSchedule,
) -> DeliveryOutcome {
    let outcome = delivery::deliver_batch(transport.as_ref(), &batch, &backoff).await;
    info!(
        delivered = outcome.delivered,
        failed = outcome.failed.len(),
        "Report cycle finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::metrics::{MetricKind, MetricValue};
    use crate::signals::ShutdownCoordinator;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FixedSampler;

    impl Sampler for FixedSampler {
        fn sample(&mut self) -> Vec<Metric> {
            vec![Metric::gauge("Alloc", 1024.0), Metric::gauge("NumCpu", 8.0)]
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Metric>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, metric: &Metric) -> Result<Metric> {
            self.sent.lock().push(metric.clone());
            Ok(metric.clone())
        }
    }

    fn config() -> ReporterConfig {
        ReporterConfig {
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            backoff: BackoffSchedule::default(),
        }
    }

    #[test]
    fn test_batch_layout() {
        let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::default());
        let mut reporter = Reporter::new(config(), transport, FixedSampler);
        reporter.poll();
        reporter.poll();

        let batch = reporter.batch();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0], Metric::counter(POLL_COUNT, 2));
        assert_eq!(batch[1].name, RANDOM_VALUE);
        assert_eq!(batch[1].kind(), MetricKind::Gauge);
        assert_eq!(batch[2], Metric::gauge("Alloc", 1024.0));
    }

    #[test]
    fn test_random_value_differs_per_report() {
        let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::default());
        let reporter = Reporter::new(config(), transport, FixedSampler);

        let first = reporter.batch()[1].value;
        let second = reporter.batch()[1].value;
        assert_ne!(first, second);
    }

    #[test]
    fn test_reporter_config_from_agent_config() {
        let reporter_config = ReporterConfig::from(&AgentConfig::default());
        assert_eq!(reporter_config.poll_interval, Duration::from_secs(2));
        assert_eq!(reporter_config.report_interval, Duration::from_secs(10));
        assert_eq!(reporter_config.backoff, BackoffSchedule::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_then_reports() {
        let transport = Arc::new(RecordingTransport::default());
        let reporter = Reporter::new(config(), transport.clone(), FixedSampler);
        let coordinator = ShutdownCoordinator::new();
        let handle = tokio::spawn(reporter.run(coordinator.subscribe()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        coordinator.trigger();
        handle.await.unwrap();

        let sent = transport.sent.lock().clone();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], Metric::counter(POLL_COUNT, 5));
        assert!(matches!(sent[1].value, MetricValue::Gauge(_)));
    }
}
