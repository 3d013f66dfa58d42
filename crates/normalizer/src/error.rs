//! Error types for the normalizer.
//!
//! Messages that cannot be classified or fail validation raise a
//! [`BadMessage`]; those go to the bad-message log. Everything else
//! (malformed envelopes, poll timeouts) is an [`Error`] variant of its own
//! and goes to the general error log.

use thiserror::Error;

/// The bad-message family: the inbound message itself is unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BadMessage {
    /// The routing key could not be classified, or a required property is missing.
    #[error("{reason}, key: {key}")]
    Unparseable { key: String, reason: String },

    /// Unittest message without a `log_url` property.
    #[error("no log url, key: {key}")]
    NoLogUrl { key: String },

    /// Build message without a build url that is not a repack.
    #[error("no build url, key: {key}")]
    NoBuildUrl { key: String },

    /// Build tag outside the known vocabulary.
    #[error("{key}, tag: {tag}, platform: {platform}, product: {product}")]
    BadTag {
        key: String,
        tag: String,
        platform: String,
        product: String,
    },

    /// Platform missing from the catalog.
    #[error("{key}, platform: {platform}")]
    BadPlatform { key: String, platform: String },

    /// OS not valid for the platform.
    #[error("{key}, platform: {platform}, os: {os}, builder: {buildername}")]
    BadOs {
        key: String,
        platform: String,
        os: String,
        buildername: String,
    },

    /// Release repack with an empty entry in its locale list.
    #[error("{key}, locales: {locales}")]
    BadLocales { key: String, locales: String },
}

impl BadMessage {
    /// Routing key of the offending message.
    pub fn key(&self) -> &str {
        match self {
            Self::Unparseable { key, .. }
            | Self::NoLogUrl { key }
            | Self::NoBuildUrl { key }
            | Self::BadTag { key, .. }
            | Self::BadPlatform { key, .. }
            | Self::BadOs { key, .. }
            | Self::BadLocales { key, .. } => key,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unparseable { .. } => "bad_pulse_message",
            Self::NoLogUrl { .. } => "no_log_url",
            Self::NoBuildUrl { .. } => "no_build_url",
            Self::BadTag { .. } => "bad_tag",
            Self::BadPlatform { .. } => "bad_platform",
            Self::BadOs { .. } => "bad_os",
            Self::BadLocales { .. } => "bad_locales",
        }
    }

    pub(crate) fn unparseable(key: &str, reason: impl Into<String>) -> Self {
        Self::Unparseable {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Normalizer errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The message was rejected during classification or validation.
    #[error("bad pulse message: {0}")]
    BadMessage(#[from] BadMessage),

    /// The log file never became available within the polling budget.
    #[error("log timeout, key: {key}, url: {logurl}")]
    LogTimeout { key: String, logurl: String },

    /// A `buildid` property that is not a recognizable date.
    #[error("invalid buildid '{buildid}': {reason}")]
    InvalidBuildId { buildid: String, reason: String },

    /// Envelope or embedded JSON that does not have the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload bytes are not UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// HTTP client could not be set up.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Publishing failed in a way retrying cannot fix.
    #[error("publish error: {0}")]
    Publish(String),
}

impl Error {
    /// Whether this error belongs to the bad-message family.
    pub fn is_bad_message(&self) -> bool {
        matches!(self, Self::BadMessage(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadMessage(bad) => bad.kind(),
            Self::LogTimeout { .. } => "log_timeout",
            Self::InvalidBuildId { .. } => "invalid_buildid",
            Self::Json(_) => "json",
            Self::Utf8(_) => "utf8",
            Self::Http(_) => "http",
            Self::Publish(_) => "publish",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_message_display() {
        let err = BadMessage::BadTag {
            key: "build.foo.1.log_uploaded".to_string(),
            tag: "bogus".to_string(),
            platform: "linux".to_string(),
            product: "firefox".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "build.foo.1.log_uploaded, tag: bogus, platform: linux, product: firefox"
        );
        assert_eq!(err.key(), "build.foo.1.log_uploaded");
    }

    #[test]
    fn test_error_families() {
        let bad: Error = BadMessage::NoLogUrl {
            key: "k".to_string(),
        }
        .into();
        assert!(bad.is_bad_message());
        assert_eq!(bad.kind(), "no_log_url");

        let timeout = Error::LogTimeout {
            key: "k".to_string(),
            logurl: "http://example.com/log".to_string(),
        };
        assert!(!timeout.is_bad_message());
        assert_eq!(timeout.kind(), "log_timeout");
    }
}
