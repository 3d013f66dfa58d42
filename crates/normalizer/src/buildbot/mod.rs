//! Buildbot message adapter.
//!
//! This module provides the `BuildbotAdapter` which implements
//! the `MessageAdapter` trait for normalizing buildbot pulse messages.

mod adapter;
pub mod catalog;
pub mod properties;
pub mod routing_key;
pub mod validate;

pub use adapter::BuildbotAdapter;
