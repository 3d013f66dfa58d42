//! Translator service for normalizing raw pulse build messages.
//!
//! This crate provides a plugin-based architecture for turning irregular
//! build and test notifications into records with a predictable routing-key
//! taxonomy. To translate another message family, implement the
//! `MessageAdapter` trait.
//!
//! # Architecture
//!
//! ```text
//! Raw Messages (NATS) --> MessageAdapter --> BuildRecord ----------------> NATS
//!                         (classify &        (unittests wait in LogPoller
//!                          validate)          until their log is served)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use normalizer::{BuildbotAdapter, BusPublisher, Dispatcher, HttpProbe, MessageAdapter, TranslatorService};
//!
//! let publisher = Arc::new(BusPublisher::new(nats_client.clone()));
//! let probe = Arc::new(HttpProbe::new(Duration::from_secs(30))?);
//! let dispatcher = Dispatcher::new(BuildbotAdapter::new(), BuildbotAdapter::default_config(), publisher, probe);
//! TranslatorService::new(dispatcher, nats_client, durable, shutdown_rx).run().await?;
//! ```

pub mod buildbot;
pub mod error;
pub mod poller;
pub mod publisher;
pub mod schema;
pub mod service;
pub mod subject;
pub mod traits;

// Re-export core types
pub use error::{BadMessage, Error, Result};
pub use poller::{HttpProbe, LogPoller, LogProbe, PollSettings, ProbeOutcome};
pub use publisher::{BusPublisher, DisplayPublisher, Publish};
pub use schema::{BuildRecord, BuildType, IgnoreReason, RecordKind, Translation};
pub use service::{Dispatcher, TranslatorService, BAD_MESSAGE_TARGET};
pub use subject::{output_key, parse_output_key, OutputKey};
pub use traits::{AdapterConfig, MessageAdapter};

// Re-export message adapters
pub use buildbot::BuildbotAdapter;
