//! Turns extracted properties plus a classified key into validated records.

use crate::error::{BadMessage, Result};
use crate::schema::{BuildRecord, BuildType, IgnoreReason, RecordKind, Translation};
use serde_json::{Map, Value};

use super::catalog;
use super::properties::{self, Property};
use super::routing_key::{self, BuildKey, Classification, KeyContext, UnittestKey};

const EMULATOR_BUILD_URL: &str = "https://pvtbuilds.mozilla.org/pub/mozilla.org/b2g/tinderbox-builds";

/// Status assigned to a nightly repack locale that did not succeed.
const REPACK_FAILURE_STATUS: i64 = 2;

/// Translate one buildbot message.
///
/// `results` is the buildbot result code carried next to the properties.
/// Build messages for repacks fan out into one record per locale; every
/// record is validated before any is returned.
pub fn normalize(
    key: &str,
    properties: &[Property],
    results: Option<i64>,
    timestamp: &str,
) -> Result<Translation> {
    let properties::Extracted {
        mut record,
        stage_platform,
    } = properties::extract(key, timestamp, properties)?;

    if record.tree.is_empty() {
        return Err(BadMessage::unparseable(key, "no 'branch' property").into());
    }

    record.status = results;
    record.buildtype = BuildType::from_key(key);

    let build_platform = record
        .platform
        .clone()
        .or_else(|| stage_platform.clone())
        .or_else(|| catalog::guess_platform(key).map(str::to_string));

    let builder_name = record.buildername.clone().unwrap_or_default();
    let ctx = KeyContext {
        tree: &record.tree,
        platform: build_platform.as_deref(),
        builder_name: &builder_name,
    };

    match routing_key::classify(key, &ctx) {
        Classification::Ignored(reason) => Ok(Translation::Ignored(reason)),
        Classification::Unsupported { reason } => Err(BadMessage::unparseable(key, reason).into()),
        Classification::Unittest(parsed) => {
            apply_unittest_key(&mut record, parsed, stage_platform);
            validate_unittest(record)
        }
        Classification::Build(parsed) => {
            record.platform = build_platform;
            apply_build_key(&mut record, parsed);
            validate_build(record)
        }
    }
}

fn apply_unittest_key(record: &mut BuildRecord, parsed: UnittestKey, stage_platform: Option<String>) {
    record.kind = RecordKind::Unittest;
    record.os = Some(parsed.os);
    record.test = Some(parsed.test);
    record.talos = parsed.talos;
    if stage_platform.is_some() {
        record.platform = stage_platform;
    }
}

fn apply_build_key(record: &mut BuildRecord, parsed: BuildKey) {
    record.kind = RecordKind::Build;
    record.tags = parsed.tags;
    if parsed.xulrunner {
        record.product = Some("xulrunner".to_string());
    }

    let platform = record.platform_or_unknown().to_string();
    if platform.contains("emulator") && !record.key.contains("try") {
        if let Some(buildid) = &record.buildid {
            record.buildurl = Some(format!(
                "{}/{}-{}/{}/emulator.tar.gz",
                EMULATOR_BUILD_URL, record.tree, platform, buildid
            ));
        }
    }
}

fn validate_unittest(mut record: BuildRecord) -> Result<Translation> {
    let key = record.key.clone();

    if record.logurl.as_deref().map_or(true, str::is_empty) {
        return Err(BadMessage::NoLogUrl { key }.into());
    }

    let platform = match record.platform.clone() {
        Some(platform) => platform,
        None => {
            let source = record.buildername.clone().unwrap_or_else(|| key.clone());
            match catalog::guess_platform(&source) {
                Some(guessed) => guessed.to_string(),
                None => {
                    return Err(BadMessage::BadPlatform {
                        key,
                        platform: "unknown".to_string(),
                    }
                    .into())
                }
            }
        }
    };

    if catalog::is_ignored_platform(&platform) {
        return Ok(Translation::Ignored(IgnoreReason::IgnoredPlatform));
    }
    if !catalog::is_known_platform(&platform) {
        return Err(BadMessage::BadPlatform { key, platform }.into());
    }

    let os = record.os.clone().unwrap_or_default();
    if !catalog::is_valid_os(&platform, &os) {
        return Err(BadMessage::BadOs {
            key,
            platform,
            os,
            buildername: record.buildername.clone().unwrap_or_default(),
        }
        .into());
    }

    record.platform = Some(platform);
    Ok(Translation::Unittest(Box::new(record)))
}

fn validate_build(mut record: BuildRecord) -> Result<Translation> {
    let key = record.key.clone();
    let platform = record.platform_or_unknown().to_string();

    if catalog::is_ignored_platform(&platform) {
        return Ok(Translation::Ignored(IgnoreReason::IgnoredPlatform));
    }
    if !catalog::is_known_platform(&platform) {
        return Err(BadMessage::BadPlatform { key, platform }.into());
    }

    if let Some(tag) = record.tags.iter().find(|t| !catalog::is_known_tag(t)) {
        return Err(BadMessage::BadTag {
            key,
            tag: tag.clone(),
            platform,
            product: record.product_or_unknown().to_string(),
        }
        .into());
    }

    if key.contains("repack") {
        record.repack = true;
        return release_repacks(record).map(Translation::Builds);
    }

    if record.locales.as_deref().is_some_and(|l| !l.is_empty()) {
        return nightly_repacks(record).map(Translation::Builds);
    }

    if record.buildurl.as_deref().map_or(true, str::is_empty) {
        return Err(BadMessage::NoBuildUrl { key }.into());
    }

    Ok(Translation::Builds(vec![record]))
}

/// Release repacks list their locales as comma-separated text.
fn release_repacks(record: BuildRecord) -> Result<Vec<BuildRecord>> {
    let locales = record.locales.clone().unwrap_or_default();
    if locales.is_empty() {
        return Err(BadMessage::unparseable(&record.key, "no \"locales\" property").into());
    }

    let mut records = Vec::new();
    for locale in locales.split(',') {
        if locale.is_empty() {
            return Err(BadMessage::BadLocales {
                key: record.key.clone(),
                locales: locales.clone(),
            }
            .into());
        }
        let mut repack = record.clone();
        repack.locale = locale.to_string();
        records.push(repack);
    }
    Ok(records)
}

/// Nightly repacks carry a JSON object mapping locale to result.
fn nightly_repacks(record: BuildRecord) -> Result<Vec<BuildRecord>> {
    let raw = record.locales.clone().unwrap_or_default();
    let results: Map<String, Value> = serde_json::from_str(&raw)?;

    Ok(results
        .into_iter()
        .map(|(locale, result)| {
            let mut repack = record.clone();
            repack.locale = locale;
            repack.locales = None;
            repack.repack = true;
            repack.status = Some(repack_status(&result));
            repack
        })
        .collect())
}

fn repack_status(result: &Value) -> i64 {
    let succeeded = match result {
        Value::String(s) => s.eq_ignore_ascii_case("success") || s == "0",
        Value::Number(n) => n.as_i64() == Some(0),
        _ => false,
    };
    if succeeded {
        0
    } else {
        REPACK_FAILURE_STATUS
    }
}
