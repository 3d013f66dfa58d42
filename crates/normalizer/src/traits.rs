//! Core traits for message adapters (plugin interface).
//!
//! To translate another message family, implement the `MessageAdapter` trait.
//!
//! # Example
//!
//! ```ignore
//! pub struct TaskclusterAdapter;
//!
//! impl MessageAdapter for TaskclusterAdapter {
//!     const NAME: &'static str = "taskcluster";
//!     const FILTER_SUBJECT: &'static str = "pulse.raw.taskcluster.>";
//!
//!     fn translate(&self, routing_key: &str, payload: &str) -> Result<Translation> {
//!         // Classify, validate and build records
//!     }
//! }
//! ```

use crate::error::Result;
use crate::schema::{BuildRecord, Translation};
use crate::subject;

/// Configuration for a message adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Source NATS stream name (for JetStream persistence).
    pub source_stream: String,
    /// Subject filter pattern to subscribe to (e.g., "pulse.raw.>").
    pub filter_subject: String,
    /// Destination stream name (for JetStream persistence).
    pub dest_stream: String,
    /// Output subject prefix (e.g., "pulse.normalized").
    pub output_subject_prefix: String,
}

impl AdapterConfig {
    /// Routing key carried by a bus subject: the part matched by the
    /// trailing `>` of the filter. Subjects outside the filter are returned
    /// unchanged.
    pub fn routing_key_for(&self, bus_subject: &str) -> String {
        match self.filter_subject.strip_suffix('>') {
            Some(prefix) => bus_subject
                .strip_prefix(prefix)
                .unwrap_or(bus_subject)
                .to_string(),
            None => bus_subject.to_string(),
        }
    }
}

/// Core trait for message adapters.
///
/// The translator service is generic over this trait.
pub trait MessageAdapter: Send + Sync + 'static {
    /// Message family name (e.g., "buildbot").
    const NAME: &'static str;

    /// Default NATS subject filter for this message family.
    const FILTER_SUBJECT: &'static str;

    /// Create default adapter configuration.
    fn default_config() -> AdapterConfig {
        AdapterConfig {
            source_stream: "PULSE_RAW".to_string(),
            filter_subject: Self::FILTER_SUBJECT.to_string(),
            dest_stream: "PULSE_NORMALIZED".to_string(),
            output_subject_prefix: "pulse.normalized".to_string(),
        }
    }

    /// Translate one raw message.
    ///
    /// `routing_key` is the key derived from the bus subject; adapters may
    /// prefer a key carried inside the payload.
    fn translate(&self, routing_key: &str, payload: &str) -> Result<Translation>;

    /// Build the output subject for a normalized record.
    ///
    /// Default implementation uses: `{prefix}.{output routing key}`
    fn build_output_subject(&self, config: &AdapterConfig, record: &BuildRecord) -> String {
        format!(
            "{}.{}",
            config.output_subject_prefix,
            subject::output_key(record)
        )
    }
}
