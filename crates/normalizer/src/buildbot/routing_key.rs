//! Classification of buildbot routing keys.
//!
//! Keys look like `build.<builder>.<seq>.<event>`. The builder part embeds
//! the tree and platform, so the patterns are built per message from the
//! values the properties carry.

use crate::schema::IgnoreReason;
use regex::{Captures, Regex};

use super::catalog;

/// Substrings marking keys that are never translated.
const IGNORED_SOURCE: &str = "source";
const IGNORED_RELEASE_AUTOMATION: [&str; 5] = [
    "schedulers",
    "tag",
    "submitter",
    "final_verification",
    "fuzzer",
];
const IGNORED_JETPACK: &str = "jetpack";

/// Tokens removed when splitting the tag suffix of a build key.
const NOT_TAGS: [&str; 4] = ["debug", "pgo", "opt", "repack"];

/// Values taken from the message properties that shape the key patterns.
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    pub tree: &'a str,
    /// Resolved build platform, if any.
    pub platform: Option<&'a str>,
    pub builder_name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnittestKey {
    /// OS label after catalog conversion.
    pub os: String,
    pub test: String,
    pub talos: bool,
    /// Builder portion of the key, with shard suffixes rewritten.
    pub shard_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildKey {
    pub tags: Vec<String>,
    /// Key names a xulrunner build.
    pub xulrunner: bool,
}

/// What kind of message a routing key describes. Decided once per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Unittest(UnittestKey),
    Build(BuildKey),
    Ignored(IgnoreReason),
    Unsupported { reason: String },
}

/// Classify a routing key.
///
/// Test keys are tried first, then the ignore list, then build keys.
/// Only `log_uploaded` events are translated; `finished` events that
/// match either pattern are ignored.
pub fn classify(key: &str, ctx: &KeyContext<'_>) -> Classification {
    let tree = regex::escape(ctx.tree);

    let unittest = format!(
        r"^build\.(({tree})[-_](.*?)(-debug|-o-debug|-pgo|_pgo|_test)?[-_](test|unittest|pgo)-(.*?))\.(\d+)\.(log_uploaded|finished)"
    );
    match Regex::new(&unittest) {
        Ok(re) => {
            if let Some(caps) = re.captures(key) {
                if is_finished(&caps, 8) {
                    return Classification::Ignored(IgnoreReason::FinishedEvent);
                }
                return Classification::Unittest(unittest_key(&caps, ctx.builder_name));
            }
        }
        Err(e) => {
            return Classification::Unsupported {
                reason: format!("unusable tree '{}': {}", ctx.tree, e),
            }
        }
    }

    if let Some(reason) = ignore_reason(key) {
        return Classification::Ignored(reason);
    }

    let Some(platform) = ctx.platform else {
        return Classification::Unsupported {
            reason: "no \"platform\" property".to_string(),
        };
    };

    let build = format!(
        r"^build\.((release-|jetpack-|b2g_)?({tree})[-_](xulrunner[-_])?({platform})([-_]?)(.*?))\.(\d+)\.(log_uploaded|finished)",
        platform = regex::escape(platform)
    );
    let caps = Regex::new(&build).ok().and_then(|re| re.captures(key));
    match caps {
        Some(caps) if is_finished(&caps, 9) => Classification::Ignored(IgnoreReason::FinishedEvent),
        Some(caps) => Classification::Build(build_key(&caps)),
        None => Classification::Unsupported {
            reason: format!("unknown message type, platform: {}", platform),
        },
    }
}

fn is_finished(caps: &Captures<'_>, group: usize) -> bool {
    caps.get(group).is_some_and(|m| m.as_str() == "finished")
}

fn group<'h>(caps: &Captures<'h>, idx: usize) -> &'h str {
    caps.get(idx).map(|m| m.as_str()).unwrap_or("")
}

fn ignore_reason(key: &str) -> Option<IgnoreReason> {
    if key.contains(IGNORED_SOURCE) {
        Some(IgnoreReason::Source)
    } else if IGNORED_RELEASE_AUTOMATION.iter().any(|s| key.contains(s)) {
        Some(IgnoreReason::ReleaseAutomation)
    } else if key.contains(IGNORED_JETPACK) {
        Some(IgnoreReason::Jetpack)
    } else {
        None
    }
}

fn unittest_key(caps: &Captures<'_>, builder_name: &str) -> UnittestKey {
    let raw_os = group(caps, 3);
    let os = match catalog::os_conversion(raw_os) {
        Some(conversion) => conversion.apply(builder_name),
        None => raw_os.to_string(),
    };

    let test = group(caps, 6).to_string();
    let short_builder = group(caps, 1);

    UnittestKey {
        os,
        shard_label: shard_label(short_builder, &test),
        test,
        talos: builder_name.contains("talos"),
    }
}

/// `mochitest_2` shards are addressed as `mochitest.2`.
fn shard_label(short_builder: &str, test: &str) -> String {
    if test.ends_with("_2") {
        if let Some(head) = short_builder.strip_suffix("_2") {
            return format!("{}.2", head);
        }
    } else if test.ends_with("_2-pgo") {
        if let Some(head) = short_builder.strip_suffix("_2-pgo") {
            return format!("{}.2-pgo", head);
        }
    }
    short_builder.to_string()
}

fn build_key(caps: &Captures<'_>) -> BuildKey {
    let suffix = group(caps, 7).replace('_', "-");
    let mut tags: Vec<String> = suffix
        .split('-')
        .filter(|tag| !NOT_TAGS.contains(tag))
        .filter(|tag| tag.is_empty() || !tag.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();

    match group(caps, 2) {
        "release-" => tags.push("release".to_string()),
        "jetpack-" => tags.push("jetpack".to_string()),
        _ => {}
    }

    let xulrunner = caps.get(4).is_some() || tags.iter().any(|t| t == "xulrunner");

    BuildKey { tags, xulrunner }
}
