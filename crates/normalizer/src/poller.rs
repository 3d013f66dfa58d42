//! Waits for a unittest's log file before publishing the record.
//!
//! Test results are only announced once the log they point at can be
//! fetched. Each pending record is polled by its own task, so one slow log
//! never holds up other messages.

use crate::error::{Error, Result};
use crate::publisher::Publish;
use crate::schema::BuildRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Default time a record may wait for its log.
pub const DEFAULT_POLL_BUDGET: Duration = Duration::from_secs(600);

/// Default pause between probes of the same log.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Result of one availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The log answered 200.
    Available,
    /// The log answered with another status.
    Missing(u16),
    /// No answer (bad url, connection error, timeout).
    Failed(String),
}

/// Checks whether a log url can be fetched.
#[async_trait]
pub trait LogProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Probes logs with an HTTP `HEAD` request.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LogProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => return ProbeOutcome::Failed(format!("invalid url: {}", e)),
        };

        match self.client.head(url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => ProbeOutcome::Available,
            Ok(response) => ProbeOutcome::Missing(response.status().as_u16()),
            Err(e) => ProbeOutcome::Failed(e.to_string()),
        }
    }
}

/// Polling cadence.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub budget: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            budget: DEFAULT_POLL_BUDGET,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Re-probes a record's log until it is available, then publishes the record.
#[derive(Clone)]
pub struct LogPoller {
    probe: Arc<dyn LogProbe>,
    publisher: Arc<dyn Publish>,
    settings: PollSettings,
}

impl LogPoller {
    pub fn new(probe: Arc<dyn LogProbe>, publisher: Arc<dyn Publish>) -> Self {
        Self::with_settings(probe, publisher, PollSettings::default())
    }

    pub fn with_settings(
        probe: Arc<dyn LogProbe>,
        publisher: Arc<dyn Publish>,
        settings: PollSettings,
    ) -> Self {
        Self {
            probe,
            publisher,
            settings,
        }
    }

    /// Poll until the log is reachable and publish, or give up with
    /// [`Error::LogTimeout`] once the budget has elapsed.
    ///
    /// The budget starts when this is called, which is when the record is
    /// queued.
    pub async fn poll(&self, record: BuildRecord, subject: String) -> Result<()> {
        let logurl = record.logurl.clone().unwrap_or_default();
        let started = Instant::now();

        loop {
            match self.probe.probe(&logurl).await {
                ProbeOutcome::Available => {
                    self.publisher.publish(&subject, &record).await?;
                    return Ok(());
                }
                ProbeOutcome::Missing(status) => {
                    debug!("[poller] {} returned {}, key: {}", logurl, status, record.key)
                }
                ProbeOutcome::Failed(reason) => {
                    debug!("[poller] {} unreachable ({}), key: {}", logurl, reason, record.key)
                }
            }

            if started.elapsed() > self.settings.budget {
                return Err(Error::LogTimeout {
                    key: record.key,
                    logurl,
                });
            }

            tokio::time::sleep(self.settings.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers with scripted outcomes, then repeats the last one.
    struct ScriptedProbe {
        outcomes: Mutex<VecDeque<ProbeOutcome>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProbe {
        fn new(outcomes: Vec<ProbeOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LogProbe for ScriptedProbe {
        async fn probe(&self, _url: &str) -> ProbeOutcome {
            self.calls.lock().unwrap().push(Instant::now());
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            }
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, BuildRecord)>>,
    }

    #[async_trait]
    impl Publish for RecordingPublisher {
        async fn publish(&self, subject: &str, record: &BuildRecord) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((subject.to_string(), record.clone()));
            Ok(())
        }
    }

    fn record() -> BuildRecord {
        let mut record = BuildRecord::new(
            "build.mozilla-central_ubuntu64_vm_test-xpcshell.5.log_uploaded",
            "2024-01-01T00:00:00Z",
        );
        record.logurl = Some("http://example.com/xpcshell.txt.gz".to_string());
        record
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_once_log_appears() {
        let probe = ScriptedProbe::new(vec![
            ProbeOutcome::Missing(404),
            ProbeOutcome::Missing(404),
            ProbeOutcome::Available,
        ]);
        let publisher = Arc::new(RecordingPublisher::default());
        let poller = LogPoller::new(probe.clone(), publisher.clone());

        let start = Instant::now();
        poller
            .poll(record(), "pulse.normalized.unittest.x".to_string())
            .await
            .unwrap();

        assert_eq!(probe.call_count(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "pulse.normalized.unittest.x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_publishing() {
        let probe = ScriptedProbe::new(vec![ProbeOutcome::Missing(404)]);
        let publisher = Arc::new(RecordingPublisher::default());
        let poller = LogPoller::new(probe.clone(), publisher.clone());

        let start = Instant::now();
        let result = poller
            .poll(record(), "pulse.normalized.unittest.x".to_string())
            .await;

        match result {
            Err(Error::LogTimeout { key, logurl }) => {
                assert_eq!(key, "build.mozilla-central_ubuntu64_vm_test-xpcshell.5.log_uploaded");
                assert_eq!(logurl, "http://example.com/xpcshell.txt.gz");
            }
            other => panic!("expected LogTimeout, got {:?}", other),
        }
        assert!(start.elapsed() >= Duration::from_secs(605));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failures_are_retried() {
        let probe = ScriptedProbe::new(vec![
            ProbeOutcome::Failed("connection refused".to_string()),
            ProbeOutcome::Available,
        ]);
        let publisher = Arc::new(RecordingPublisher::default());
        let poller = LogPoller::with_settings(
            probe.clone(),
            publisher.clone(),
            PollSettings {
                budget: Duration::from_secs(60),
                interval: Duration::from_secs(5),
            },
        );

        poller.poll(record(), "subject".to_string()).await.unwrap();
        assert_eq!(probe.call_count(), 2);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_http_probe_rejects_invalid_url() {
        let probe = HttpProbe::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            probe.probe("not a url").await,
            ProbeOutcome::Failed(_)
        ));
    }
}
