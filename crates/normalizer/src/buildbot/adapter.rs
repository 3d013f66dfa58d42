//! Buildbot message adapter implementation.

use crate::error::Result;
use crate::schema::Translation;
use crate::traits::MessageAdapter;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::properties::Property;
use super::validate;

/// Buildbot message adapter.
///
/// Handles classification, validation and normalization of buildbot
/// build and test completion notifications.
#[derive(Debug, Default, Clone)]
pub struct BuildbotAdapter;

impl BuildbotAdapter {
    /// Create a new buildbot adapter.
    pub fn new() -> Self {
        Self
    }
}

impl MessageAdapter for BuildbotAdapter {
    const NAME: &'static str = "buildbot";
    const FILTER_SUBJECT: &'static str = "pulse.raw.>";

    fn translate(&self, routing_key: &str, payload: &str) -> Result<Translation> {
        let message: RawPulseMessage = serde_json::from_str(payload)?;
        let key = message
            .meta
            .routing_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| routing_key.to_string());

        let properties: Vec<Property> = message
            .payload
            .build
            .properties
            .iter()
            .filter_map(|raw| {
                let prop = Property::from_wire(raw);
                if prop.is_none() {
                    debug!("[{}] Skipping malformed property {}", Self::NAME, raw);
                }
                prop
            })
            .collect();

        let timestamp = translation_timestamp(Utc::now());
        validate::normalize(&key, &properties, message.payload.build.results, &timestamp)
    }
}

/// Whole seconds, `Z` suffix: `2024-01-01T12:00:00Z`.
fn translation_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Raw Message Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPulseMessage {
    #[serde(rename = "_meta", default)]
    meta: RawMeta,
    payload: RawPayload,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    routing_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    build: RawBuild,
}

#[derive(Debug, Deserialize)]
struct RawBuild {
    #[serde(default)]
    properties: Vec<Value>,
    #[serde(default)]
    results: Option<i64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildbot::routing_key::{self, Classification, KeyContext};
    use crate::error::{BadMessage, Error};
    use crate::schema::{BuildType, IgnoreReason};
    use crate::subject::{self, OutputKey};
    use crate::traits::AdapterConfig;

    fn message(key: &str, properties: &str) -> String {
        format!(
            r#"{{
                "_meta": {{"routing_key": "{key}", "exchange": "exchange/build/"}},
                "payload": {{"build": {{"results": 0, "properties": {properties}}}}}
            }}"#
        )
    }

    #[test]
    fn test_scenario_unittest_debug_key() {
        let key = "build.mozilla-central-linux64-debug_test-mochitest-1.12.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "mozilla-central", "Build"],
                ["platform", "linux64-debug", "Build"],
                ["buildername", "Ubuntu VM 12.04 x64 mozilla-central debug test mochitest-1", "Build"],
                ["log_url", "http://example.com/mochitest-1.txt.gz", "Build"]
            ]"#,
        );

        let classification = routing_key::classify(
            key,
            &KeyContext {
                tree: "mozilla-central",
                platform: Some("linux64"),
                builder_name: "Ubuntu VM 12.04 x64 mozilla-central debug test mochitest-1",
            },
        );
        match classification {
            Classification::Unittest(parsed) => {
                assert_eq!(parsed.test, "mochitest-1");
                assert!(!parsed.talos);
            }
            other => panic!("expected unittest, got {:?}", other),
        }

        // The raw OS token is the platform id, which is not one of its OS labels.
        match BuildbotAdapter::new().translate(key, &json) {
            Err(Error::BadMessage(BadMessage::BadOs { platform, os, .. })) => {
                assert_eq!(platform, "linux64");
                assert_eq!(os, "linux64");
            }
            other => panic!("expected BadOs, got {:?}", other),
        }
    }

    #[test]
    fn test_unittest_translation() {
        let key = "build.mozilla-central_ubuntu64_vm-debug_test-mochitest-1.12.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "mozilla-central", "Build"],
                ["platform", "linux64-debug", "Build"],
                ["buildername", "Ubuntu VM 12.04 x64 mozilla-central debug test mochitest-1", "Build"],
                ["log_url", "http://example.com/mochitest-1.txt.gz", "Build"],
                ["revision", "abcdef123456", "Build"],
                ["slavename", "tst-linux64-spot-123", "BuildSlave"]
            ]"#,
        );

        let record = match BuildbotAdapter::new().translate(key, &json).unwrap() {
            Translation::Unittest(record) => record,
            other => panic!("expected unittest, got {:?}", other),
        };

        assert_eq!(record.tree, "mozilla-central");
        assert_eq!(record.buildtype, BuildType::Debug);
        assert_eq!(record.platform.as_deref(), Some("linux64"));
        assert_eq!(record.test.as_deref(), Some("mochitest-1"));
        assert_eq!(record.slave.as_deref(), Some("tst-linux64-spot-123"));
        assert_eq!(record.status, Some(0));
        assert!(!record.talos);
    }

    #[test]
    fn test_scenario_l10n_tag_and_locale() {
        let key = "build.mozilla-central-linux64-l10n_5.3.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "mozilla-central", "Build"],
                ["platform", "linux64", "Build"],
                ["locale", "de", "Build"],
                ["packageUrl", "http://example.com/firefox.de.tar.bz2", "Build"]
            ]"#,
        );

        let records = match BuildbotAdapter::new().translate(key, &json).unwrap() {
            Translation::Builds(records) => records,
            other => panic!("expected builds, got {:?}", other),
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags, vec!["l10n".to_string()]);
        assert_eq!(
            subject::output_key(&records[0]),
            "build.mozilla-central.linux64.opt.l10n.de.mozilla-central-linux64-l10n_5"
        );
    }

    #[test]
    fn test_scenario_unknown_platform() {
        let key = "build.mozilla-central-solaris.1.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "mozilla-central", "Build"],
                ["platform", "solaris", "Build"],
                ["packageUrl", "http://example.com/firefox.tar.bz2", "Build"]
            ]"#,
        );

        match BuildbotAdapter::new().translate(key, &json) {
            Err(Error::BadMessage(BadMessage::BadPlatform { platform, .. })) => {
                assert_eq!(platform, "solaris")
            }
            other => panic!("expected BadPlatform, got {:?}", other),
        }
    }

    #[test]
    fn test_scenario_jetpack_ignored() {
        let key = "build.jetpack-mozilla-central-linux64.1.log_uploaded";
        let json = message(
            key,
            r#"[["branch", "mozilla-central", "Build"], ["platform", "linux64", "Build"]]"#,
        );

        assert_eq!(
            BuildbotAdapter::new().translate(key, &json).unwrap(),
            Translation::Ignored(IgnoreReason::Jetpack)
        );
    }

    #[test]
    fn test_repack_yields_one_record_per_locale() {
        let key = "build.release-mozilla-release-win32_repack_2.4.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "releases/mozilla-release", "Build"],
                ["platform", "win32", "Build"],
                ["product", "firefox", "Build"],
                ["locales", "de,fr,ja,zh-TW", "Build"]
            ]"#,
        );

        let records = match BuildbotAdapter::new().translate(key, &json).unwrap() {
            Translation::Builds(records) => records,
            other => panic!("expected builds, got {:?}", other),
        };
        assert_eq!(records.len(), 4);

        let mut first = records[0].clone();
        for record in &records[1..] {
            first.locale = record.locale.clone();
            assert_eq!(&first, record);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let key = "build.mozilla-central-linux64-weird.1.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "mozilla-central", "Build"],
                ["platform", "linux64", "Build"],
                ["product", "Firefox", "Build"],
                ["packageUrl", "http://example.com/firefox.tar.bz2", "Build"]
            ]"#,
        );

        match BuildbotAdapter::new().translate(key, &json) {
            Err(Error::BadMessage(BadMessage::BadTag { tag, product, .. })) => {
                assert_eq!(tag, "weird");
                assert_eq!(product, "firefox");
            }
            other => panic!("expected BadTag, got {:?}", other),
        }
    }

    #[test]
    fn test_output_subject_round_trip() {
        let adapter = BuildbotAdapter::new();
        let config = BuildbotAdapter::default_config();
        let key = "build.mozilla-inbound-win64-debug-nightly.7.log_uploaded";
        let json = message(
            key,
            r#"[
                ["branch", "integration/mozilla-inbound", "Build"],
                ["platform", "win64", "Build"],
                ["buildid", "20240305101112", "Build"],
                ["build_url", "http://example.com/firefox.win64.zip", "Build"]
            ]"#,
        );

        let records = match adapter.translate(key, &json).unwrap() {
            Translation::Builds(records) => records,
            other => panic!("expected builds, got {:?}", other),
        };
        let output = adapter.build_output_subject(&config, &records[0]);
        assert_eq!(
            output,
            "pulse.normalized.build.mozilla-inbound.win64.debug.nightly.mozilla-inbound-win64-debug-nightly"
        );

        let routing_key = output.trim_start_matches("pulse.normalized.");
        match subject::parse_output_key(routing_key) {
            Some(OutputKey::Build {
                tree,
                platform,
                buildtype,
                tags,
                locale,
                ..
            }) => {
                assert_eq!(tree, records[0].tree);
                assert_eq!(Some(platform), records[0].platform);
                assert_eq!(buildtype, records[0].buildtype);
                assert_eq!(tags, records[0].tags);
                assert_eq!(locale, None);
            }
            other => panic!("expected build key, got {:?}", other),
        }
    }

    #[test]
    fn test_routing_key_from_subject_when_meta_missing() {
        let config: AdapterConfig = BuildbotAdapter::default_config();
        let key = config.routing_key_for("pulse.raw.build.mozilla-central-linux64.1.finished");
        let json = r#"{"payload": {"build": {"properties": [["branch", "mozilla-central", "Build"], ["platform", "linux64", "Build"]]}}}"#;

        assert_eq!(
            BuildbotAdapter::new().translate(&key, json).unwrap(),
            Translation::Ignored(IgnoreReason::FinishedEvent)
        );
    }

    #[test]
    fn test_malformed_envelope() {
        let result = BuildbotAdapter::new().translate("build.x.1.log_uploaded", r#"{"_meta": {}}"#);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_malformed_properties_skipped() {
        let key = "build.mozilla-central-linux64.1.log_uploaded";
        let json = message(
            key,
            r#"[
                "garbage",
                ["branch", "mozilla-central", "Build"],
                ["platform", "linux64", "Build"],
                ["packageUrl", "http://example.com/firefox.tar.bz2", "Build"]
            ]"#,
        );
        assert!(matches!(
            BuildbotAdapter::new().translate(key, &json).unwrap(),
            Translation::Builds(_)
        ));
    }

    #[test]
    fn test_translation_timestamp_format() {
        let now = DateTime::parse_from_rfc3339("2024-01-01T12:00:00.123456789+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(translation_timestamp(now), "2024-01-01T12:00:00Z");
    }
}
