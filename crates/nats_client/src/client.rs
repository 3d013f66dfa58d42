//! NATS client implementation with JetStream support.

use anyhow::Result;
use async_nats::jetstream::{self, consumer::pull, stream::Stream};
use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use futures::{Stream as FuturesStream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::{info, warn};

/// Default retention period for streams (one day).
pub const DEFAULT_RETENTION_SECS: u64 = 86_400;

/// Default max messages per stream.
pub const DEFAULT_MAX_MESSAGES: i64 = 1_000_000;

/// Default max bytes per stream (1GB).
pub const DEFAULT_MAX_BYTES: i64 = 1_073_741_824;

/// Configuration for creating a stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Stream name.
    pub name: String,
    /// Subject patterns to capture.
    pub subjects: Vec<String>,
    /// Retention period in seconds.
    pub max_age_secs: u64,
    /// Maximum number of messages.
    pub max_messages: i64,
    /// Maximum bytes.
    pub max_bytes: i64,
}

impl StreamConfig {
    /// Create a stream config capturing a single subject pattern.
    pub fn new(name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subjects: vec![subject.into()],
            max_age_secs: DEFAULT_RETENTION_SECS,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Connection parameters for the bus.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Server URL, e.g. `nats://localhost:4222`.
    pub url: String,
    /// Optional user for password authentication.
    pub user: Option<String>,
    /// Optional password for password authentication.
    pub password: Option<String>,
    /// Client label reported to the server and used as durable consumer name.
    pub label: String,
}

/// A message handed to the consumer. Durable deliveries are acknowledged
/// before they are yielded.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Subject the message was published on.
    pub subject: String,
    /// Raw payload bytes.
    pub payload: Bytes,
}

/// Stream of inbound messages, from either a core subscription or a durable
/// JetStream consumer.
pub type InboundStream = Pin<Box<dyn FuturesStream<Item = InboundMessage> + Send>>;

/// Wrapper around the NATS client with JetStream context.
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
    label: String,
}

impl NatsClient {
    /// Connect using explicit connection parameters and create a JetStream context.
    pub async fn connect_with(config: &ConnectionConfig) -> Result<Self> {
        info!("Connecting to NATS at {} as '{}'", config.url, config.label);

        let mut options = ConnectOptions::new();
        if !config.label.is_empty() {
            options = options.name(&config.label);
        }
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }

        let client = options.connect(config.url.as_str()).await?;
        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            label: config.label.clone(),
        })
    }

    /// Subscribe to a subject pattern using NATS Core (low-latency push).
    pub async fn subscribe(&self, subject: &str) -> Result<InboundStream> {
        info!("Subscribing to subject pattern: {}", subject);
        let subscriber = self.client.subscribe(subject.to_string()).await?;

        let inbound = subscriber.map(|msg| InboundMessage {
            subject: msg.subject.to_string(),
            payload: msg.payload,
        });

        Ok(Box::pin(inbound))
    }

    /// Consume a subject pattern through a durable JetStream consumer.
    ///
    /// The consumer survives restarts so messages published while the
    /// service is down are delivered on reconnect. Each message is acked as
    /// soon as it is pulled.
    pub async fn subscribe_durable(
        &self,
        stream_config: &StreamConfig,
        subject: &str,
    ) -> Result<InboundStream> {
        let stream = self.ensure_stream_with_config(stream_config).await?;
        let durable_name = durable_consumer_name(&self.label);

        info!(
            "Attaching durable consumer '{}' to stream '{}' ({})",
            durable_name, stream_config.name, subject
        );

        let consumer = stream
            .get_or_create_consumer(
                &durable_name,
                pull::Config {
                    durable_name: Some(durable_name.clone()),
                    filter_subject: subject.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await?;

        let messages = consumer.messages().await?;

        let inbound = messages.filter_map(|delivery| async move {
            match delivery {
                Ok(msg) => {
                    if let Err(e) = msg.ack().await {
                        warn!("Failed to ack message on {}: {}", msg.subject, e);
                    }
                    Some(InboundMessage {
                        subject: msg.subject.to_string(),
                        payload: msg.payload.clone(),
                    })
                }
                Err(e) => {
                    warn!("Durable consumer delivery error: {}", e);
                    None
                }
            }
        });

        Ok(Box::pin(inbound))
    }

    /// Create or get a stream with the given configuration.
    pub async fn ensure_stream_with_config(&self, config: &StreamConfig) -> Result<Stream> {
        info!(
            "Ensuring stream '{}' exists (subjects: {:?}, retention: {}s)",
            config.name, config.subjects, config.max_age_secs
        );

        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.name.clone(),
                subjects: config.subjects.clone(),
                retention: jetstream::stream::RetentionPolicy::Limits,
                max_messages: config.max_messages,
                max_bytes: config.max_bytes,
                max_age: Duration::from_secs(config.max_age_secs),
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await?;

        info!("Stream '{}' ready", config.name);
        Ok(stream)
    }

    /// Publish a message to JetStream and wait for the server acknowledgment.
    pub async fn publish(&self, subject: impl Into<String>, payload: Bytes) -> Result<()> {
        self.jetstream
            .publish(subject.into(), payload)
            .await?
            .await?;
        Ok(())
    }
}

/// Durable consumer names may not contain subject tokens or whitespace.
fn durable_consumer_name(label: &str) -> String {
    let name: String = label
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' => '_',
            other => other,
        })
        .collect();

    if name.is_empty() {
        "pulse-build-translator".to_string()
    } else {
        name
    }
}
