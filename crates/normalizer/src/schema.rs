//! Normalized build record schema definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Locale assumed when a message names none.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Build configuration type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    #[default]
    Opt,
    Debug,
    Pgo,
}

impl BuildType {
    /// Build type implied by a raw routing key.
    pub fn from_key(key: &str) -> Self {
        if key.contains("debug") {
            Self::Debug
        } else if key.contains("pgo") {
            Self::Pgo
        } else {
            Self::Opt
        }
    }

    /// Parse a canonical build type token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "opt" => Some(Self::Opt),
            "debug" => Some(Self::Debug),
            "pgo" => Some(Self::Pgo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opt => "opt",
            Self::Debug => "debug",
            Self::Pgo => "pgo",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output taxonomy a record belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordKind {
    #[default]
    Build,
    Unittest,
}

/// Canonical normalized build or test notification.
///
/// Every common field is always serialized (as `null` when unknown) so
/// downstream consumers see a stable shape. Path-specific fields are omitted
/// when they do not apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildRecord {
    /// Original inbound routing key.
    pub key: String,
    pub tree: String,
    pub platform: Option<String>,
    pub buildtype: BuildType,
    pub buildid: Option<String>,
    /// Build date derived from `buildid`, seconds since the epoch.
    pub builddate: Option<i64>,
    pub build_number: Option<String>,
    pub previous_buildid: Option<String>,
    pub job_number: Option<String>,
    /// Buildbot result code (0 = success, 2 = failure, ...).
    pub status: Option<i64>,
    pub buildurl: Option<String>,
    pub logurl: Option<String>,
    pub testsurl: Option<String>,
    pub test_packages_url: Option<String>,
    pub symbols_url: Option<String>,
    pub locale: String,
    /// Raw `locales` property; cleared on nightly repack fan-out.
    pub locales: Option<String>,
    pub release: Option<String>,
    pub revision: Option<String>,
    pub version: Option<String>,
    pub product: Option<String>,
    pub buildername: Option<String>,
    pub slave: Option<String>,
    pub repack: bool,
    /// Processing time (ISO 8601, UTC).
    pub timestamp: String,

    // Unittest path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default)]
    pub talos: bool,
    /// Set when the record is queued for log polling, seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insertion_time: Option<i64>,

    // Build path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blobber_files: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completemarurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completemarhash: Option<String>,

    #[serde(skip)]
    pub kind: RecordKind,
}

impl BuildRecord {
    /// Create an empty record for an inbound key.
    pub fn new(key: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timestamp: timestamp.into(),
            locale: DEFAULT_LOCALE.to_string(),
            ..Default::default()
        }
    }

    /// Platform or `"unknown"`.
    pub fn platform_or_unknown(&self) -> &str {
        self.platform.as_deref().unwrap_or("unknown")
    }

    /// Product or `"unknown"`.
    pub fn product_or_unknown(&self) -> &str {
        self.product.as_deref().unwrap_or("unknown")
    }

    /// Second dot-segment of the inbound key (the raw builder portion).
    pub fn original_subkey(&self) -> &str {
        self.key.split('.').nth(1).unwrap_or("")
    }
}

/// Reason a message was dropped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Only `log_uploaded` events are translated.
    FinishedEvent,
    /// Source tarball jobs.
    Source,
    /// Release automation bookkeeping (schedulers, tagging, submitters, ...).
    ReleaseAutomation,
    /// Jetpack keys do not carry a recoverable tree.
    Jetpack,
    /// Platform listed as ignored in the catalog.
    IgnoredPlatform,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinishedEvent => "finished_event",
            Self::Source => "source",
            Self::ReleaseAutomation => "release_automation",
            Self::Jetpack => "jetpack",
            Self::IgnoredPlatform => "ignored_platform",
        }
    }
}

/// Outcome of translating one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Dropped silently.
    Ignored(IgnoreReason),
    /// Validated unittest awaiting its log file.
    Unittest(Box<BuildRecord>),
    /// Validated build records, one per locale.
    Builds(Vec<BuildRecord>),
}
