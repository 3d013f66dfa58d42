//! Thin NATS bus client used by the translator.
//!
//! Wraps connection setup, inbound subscriptions (core or durable JetStream)
//! and acknowledged publishing, plus the failure-window backoff both sides
//! share.

pub mod backoff;
pub mod client;

pub use backoff::{retry_forever, FailureWindow, RetryPolicy};
pub use client::{ConnectionConfig, InboundMessage, InboundStream, NatsClient, StreamConfig};
