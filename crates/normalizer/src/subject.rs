//! Output routing keys.
//!
//! Unittests:
//! `{talos|unittest}.<tree>.<platform>.<os>.<buildtype>.<test>.<product>.<subkey>`
//!
//! Builds:
//! `build.<tree>.<platform>.<buildtype>[.<tag>]*[.<locale>].<subkey>`, where the
//! locale is present only for `l10n` builds.

use crate::schema::{BuildRecord, BuildType, RecordKind};

const L10N_TAG: &str = "l10n";

/// Output routing key for a validated record.
pub fn output_key(record: &BuildRecord) -> String {
    match record.kind {
        RecordKind::Unittest => unittest_key(record),
        RecordKind::Build => build_key(record),
    }
}

fn unittest_key(record: &BuildRecord) -> String {
    let prefix = if record.talos { "talos" } else { "unittest" };
    [
        prefix,
        record.tree.as_str(),
        record.platform_or_unknown(),
        record.os.as_deref().unwrap_or("unknown"),
        record.buildtype.as_str(),
        record.test.as_deref().unwrap_or("unknown"),
        record.product_or_unknown(),
        record.original_subkey(),
    ]
    .join(".")
}

fn build_key(record: &BuildRecord) -> String {
    let mut segments: Vec<&str> = vec![
        "build",
        record.tree.as_str(),
        record.platform_or_unknown(),
        record.buildtype.as_str(),
    ];
    segments.extend(record.tags.iter().map(String::as_str).filter(|t| !t.is_empty()));
    if record.tags.iter().any(|t| t == L10N_TAG) {
        segments.push(record.locale.as_str());
    }
    segments.push(record.original_subkey());
    segments.join(".")
}

/// Fields recovered from an output routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKey {
    Unittest {
        talos: bool,
        tree: String,
        platform: String,
        os: String,
        buildtype: BuildType,
        test: String,
        product: String,
        subkey: String,
    },
    Build {
        tree: String,
        platform: String,
        buildtype: BuildType,
        tags: Vec<String>,
        locale: Option<String>,
        subkey: String,
    },
}

/// Parse an output routing key. Returns `None` for keys this translator
/// would never produce.
///
/// Segments are split on `.`, so a tree, platform or test name that itself
/// contains a dot (`mozilla-1.9.2`) shifts every later field and the result
/// is wrong or `None`. A build key with no tags parses back to the single
/// empty tag the translator assigns to untagged builds.
pub fn parse_output_key(key: &str) -> Option<OutputKey> {
    let segments: Vec<&str> = key.split('.').collect();

    match segments.as_slice() {
        [prefix @ ("talos" | "unittest"), tree, platform, os, buildtype, test, product, subkey] => {
            Some(OutputKey::Unittest {
                talos: *prefix == "talos",
                tree: tree.to_string(),
                platform: platform.to_string(),
                os: os.to_string(),
                buildtype: BuildType::parse(buildtype)?,
                test: test.to_string(),
                product: product.to_string(),
                subkey: subkey.to_string(),
            })
        }
        ["build", tree, platform, buildtype, middle @ .., subkey] => {
            let mut tags: Vec<String> = middle.iter().map(|s| s.to_string()).collect();
            let locale = if tags.iter().any(|t| t == L10N_TAG) {
                tags.pop()
            } else {
                None
            };
            if tags.is_empty() {
                tags.push(String::new());
            }
            Some(OutputKey::Build {
                tree: tree.to_string(),
                platform: platform.to_string(),
                buildtype: BuildType::parse(buildtype)?,
                tags,
                locale,
                subkey: subkey.to_string(),
            })
        }
        _ => None,
    }
}
