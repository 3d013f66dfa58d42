//! Outbound side: where validated records go.

use crate::error::{Error, Result};
use crate::schema::{BuildRecord, RecordKind};
use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use nats_client::{retry_forever, FailureWindow, NatsClient, RetryPolicy};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Hands a normalized record to the bus under an output subject.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, subject: &str, record: &BuildRecord) -> Result<()>;
}

fn kind_label(record: &BuildRecord) -> &'static str {
    match record.kind {
        RecordKind::Build => "build",
        RecordKind::Unittest if record.talos => "talos",
        RecordKind::Unittest => "unittest",
    }
}

/// Publishes to JetStream, retrying transport failures until they succeed.
///
/// The failure window belongs to the publisher, so a burst of failures
/// slows down every publish that follows until the window drains.
pub struct BusPublisher {
    client: Arc<NatsClient>,
    failures: Mutex<FailureWindow>,
}

impl BusPublisher {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self::with_policy(client, RetryPolicy::default())
    }

    pub fn with_policy(client: Arc<NatsClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            failures: Mutex::new(FailureWindow::new(policy)),
        }
    }
}

#[async_trait]
impl Publish for BusPublisher {
    async fn publish(&self, subject: &str, record: &BuildRecord) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(record)?);

        let mut attempts: u64 = 0;
        retry_forever(&self.failures, "publisher", || {
            attempts += 1;
            self.client.publish(subject.to_string(), payload.clone())
        })
        .await;

        if attempts > 1 {
            counter!("translator_publish_retries_total").increment(attempts - 1);
        }
        counter!(
            "translator_messages_published_total",
            "kind" => kind_label(record)
        )
        .increment(1);

        debug!("[publisher] Published to {}", subject);
        Ok(())
    }
}

/// Prints records instead of publishing them.
#[derive(Debug, Default, Clone)]
pub struct DisplayPublisher;

impl DisplayPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publish for DisplayPublisher {
    async fn publish(&self, subject: &str, record: &BuildRecord) -> Result<()> {
        let heading = match record.kind {
            RecordKind::Build => "Build properties",
            RecordKind::Unittest => "Test properties",
        };
        let json = serde_json::to_string(record)?;

        let mut out = std::io::stdout().lock();
        writeln!(out, "{} ({}):\n{}\n", heading, subject, json)
            .map_err(|e| Error::Publish(e.to_string()))?;
        Ok(())
    }
}
