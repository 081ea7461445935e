// Metric delivery with bounded retries
// Each metric is sent on its own; one permanent failure never blocks the rest

use crate::codec;
use crate::error::{MetricsError, Result};
use crate::metrics::Metric;
use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Ordered delays between delivery attempts
///
/// Kept as data: a metric gets one attempt plus one retry per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_secs(1),
        ])
    }
}

/// Sends one metric and returns the aggregator's acknowledgement
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, metric: &Metric) -> Result<Metric>;
}

/// JSON-over-HTTP transport posting gzipped envelopes to `/update/`
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for `address`, bounding every attempt by `timeout`
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: update_url(address),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Endpoint for structured updates; a bare `host:port` gets an http scheme
pub fn update_url(address: &str) -> String {
    let base = address.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}/update/", base)
    } else {
        format!("http://{}/update/", base)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, metric: &Metric) -> Result<Metric> {
        let body = codec::compress(&codec::encode(metric)?)?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, codec::GZIP)
            .header(ACCEPT_ENCODING, codec::GZIP)
            .body(body)
            .send()
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::Transport(format!("unexpected status {}", status)));
        }

        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        let ack = Metric::try_from(codec::decode_body(encoding.as_deref(), &bytes)?)?;
        if ack.name != metric.name || ack.kind() != metric.kind() {
            return Err(MetricsError::Transport(format!(
                "acknowledgement for {}/{} does not match {}/{}",
                ack.kind(),
                ack.name,
                metric.kind(),
                metric.name
            )));
        }
        Ok(ack)
    }
}

/// Deliver one metric, sleeping through the schedule between failures
#[instrument(skip(transport, metric, schedule), fields(metric = %metric.name, kind = %metric.kind()))]
pub async fn deliver_with_retry(
    transport: &dyn Transport,
    metric: &Metric,
    schedule: &BackoffSchedule,
) -> Result<Metric> {
    let mut delays = schedule.delays().iter();
    let mut attempt = 1;

    loop {
        match transport.send(metric).await {
            Ok(ack) => {
                debug!(attempt = attempt, "Metric delivered");
                return Ok(ack);
            }
            Err(e) => match delays.next() {
                Some(delay) => {
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
        }
    }
}

/// Summary of one report cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub failed: Vec<String>,
}

/// Deliver a batch sequentially, logging and skipping permanent failures
pub async fn deliver_batch(
    transport: &dyn Transport,
    batch: &[Metric],
    schedule: &BackoffSchedule,
) -> DeliveryOutcome {
    let mut outcome = DeliveryOutcome::default();

    for metric in batch {
        match deliver_with_retry(transport, metric, schedule).await {
            Ok(_) => outcome.delivered += 1,
            Err(e) => {
                error!(
                    metric = %metric.name,
                    kind = %metric.kind(),
                    attempts = schedule.max_attempts(),
                    error = %e,
                    "Giving up on metric after all retries"
                );
                outcome.failed.push(metric.name.clone());
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Fails the first `n` sends of each named metric, then echoes it
    #[derive(Default)]
    struct FlakyTransport {
        failures: HashMap<String, usize>,
        attempts: Mutex<Vec<String>>,
    }

    impl FlakyTransport {
        fn failing(plan: &[(&str, usize)]) -> Self {
            Self {
                failures: plan.iter().map(|(n, k)| (n.to_string(), *k)).collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts_for(&self, name: &str) -> usize {
            self.attempts.lock().iter().filter(|n| n.as_str() == name).count()
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, metric: &Metric) -> Result<Metric> {
            let seen = {
                let mut attempts = self.attempts.lock();
                attempts.push(metric.name.clone());
                attempts.iter().filter(|n| **n == metric.name).count()
            };
            let fail_first = self.failures.get(&metric.name).copied().unwrap_or(0);
            if seen <= fail_first {
                Err(MetricsError::Transport("connection refused".to_string()))
            } else {
                Ok(metric.clone())
            }
        }
    }

    #[test]
    fn test_default_schedule() {
        let schedule = BackoffSchedule::default();
        assert_eq!(
            schedule.delays(),
            &[
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(1),
            ]
        );
        assert_eq!(schedule.max_attempts(), 4);
    }

    #[test]
    fn test_update_url() {
        assert_eq!(update_url("localhost:8080"), "http://localhost:8080/update/");
        assert_eq!(update_url("http://10.0.0.1:9000/"), "http://10.0.0.1:9000/update/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_attempt_succeeds() {
        let transport = FlakyTransport::failing(&[("Alloc", 2)]);
        let metric = Metric::gauge("Alloc", 10.5);
        let start = tokio::time::Instant::now();

        let ack = deliver_with_retry(&transport, &metric, &BackoffSchedule::default())
            .await
            .unwrap();

        assert_eq!(ack, metric);
        assert_eq!(transport.attempts_for("Alloc"), 3);
        assert!(start.elapsed() >= Duration::from_millis(600));
        assert!(start.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_schedule() {
        let transport = FlakyTransport::failing(&[("Alloc", usize::MAX)]);
        let metric = Metric::gauge("Alloc", 1.0);
        let start = tokio::time::Instant::now();

        let result = deliver_with_retry(&transport, &metric, &BackoffSchedule::default()).await;

        assert!(matches!(result, Err(MetricsError::Transport(_))));
        assert_eq!(transport.attempts_for("Alloc"), 4);
        assert!(start.elapsed() >= Duration::from_millis(1600));
        assert!(start.elapsed() < Duration::from_millis(1700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_block_batch() {
        let transport = FlakyTransport::failing(&[("Broken", usize::MAX), ("Slow", 1)]);
        let batch = vec![
            Metric::gauge("Broken", 1.0),
            Metric::gauge("Slow", 2.0),
            Metric::counter("PollCount", 5),
        ];

        let outcome = deliver_batch(&transport, &batch, &BackoffSchedule::default()).await;

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.failed, vec!["Broken".to_string()]);
        assert_eq!(transport.attempts_for("Slow"), 2);
        assert_eq!(transport.attempts_for("PollCount"), 1);
    }

    #[tokio::test]
    async fn test_empty_schedule_tries_once() {
        let transport = FlakyTransport::failing(&[("Alloc", 1)]);
        let result = deliver_with_retry(
            &transport,
            &Metric::gauge("Alloc", 1.0),
            &BackoffSchedule::new(Vec::new()),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(transport.attempts_for("Alloc"), 1);
    }
}
