//! Folds buildbot `(name, value, source)` property triples into a record.

use crate::error::{Error, Result};
use crate::schema::BuildRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, error};

use super::catalog;

/// One build property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Read a property from its wire form `[name, value, source]`.
    /// The source element is optional and unused.
    pub fn from_wire(raw: &Value) -> Option<Self> {
        let parts = raw.as_array()?;
        let name = parts.first()?.as_str()?;
        let value = parts.get(1).cloned().unwrap_or(Value::Null);
        Some(Self::new(name, value))
    }
}

/// Properties folded into a record, plus the stage platform which is only
/// applied once the routing key has been classified.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub record: BuildRecord,
    pub stage_platform: Option<String>,
}

/// Scan the properties in order. A later property with the same name
/// overwrites an earlier one; unknown names are skipped.
pub fn extract(key: &str, timestamp: &str, properties: &[Property]) -> Result<Extracted> {
    let mut record = BuildRecord::new(key, timestamp);
    let mut stage_platform = None;

    for prop in properties {
        let value = value_as_string(&prop.value);

        match prop.name.as_str() {
            "buildnumber" => record.job_number = value,
            "revision" => record.revision = value,
            "product" => record.product = value.map(|p| p.to_lowercase()),
            "version" => record.version = value,
            "branch" => record.tree = value.map(|b| tree_name(&b)).unwrap_or_default(),
            "buildid" => {
                record.builddate = match &value {
                    Some(buildid) => Some(buildid_to_epoch(buildid)?),
                    None => None,
                };
                record.buildid = value;
            }
            "build_number" => record.build_number = value,
            "previous_buildid" => record.previous_buildid = value,
            "platform" => {
                record.platform = value.map(|p| strip_debug(&p)).filter(|p| !p.is_empty());
            }
            "locale" => {
                if let Some(locale) = value.filter(|l| !l.is_empty()) {
                    record.locale = locale;
                }
            }
            "locales" => record.locales = value,
            "packageUrl" | "build_url" | "fileURL" => record.buildurl = value,
            "log_url" => record.logurl = value,
            "en_revision" | "script_repo_revision" => record.release = value,
            "symbolsUrl" => record.symbols_url = value,
            "testsUrl" => record.testsurl = value,
            "testPackagesUrl" => record.test_packages_url = value,
            "buildername" => record.buildername = value,
            "slavename" => record.slave = value,
            "blobber_files" => record.blobber_files = decode_blobber_files(&prop.value),
            "stage_platform" => {
                stage_platform = value
                    .map(|sp| catalog::strip_buildtype(&sp))
                    .filter(|sp| !sp.is_empty());
            }
            "completeMarUrl" => record.completemarurl = value,
            "completeMarHash" => record.completemarhash = value,
            other => debug!("Skipping property '{}'", other),
        }
    }

    Ok(Extracted {
        record,
        stage_platform,
    })
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// `releases/mozilla-beta` becomes `mozilla-beta`.
fn tree_name(branch: &str) -> String {
    branch
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn strip_debug(platform: &str) -> String {
    match platform.find("-debug") {
        Some(idx) => platform[..idx].to_string(),
        None => platform.to_string(),
    }
}

fn decode_blobber_files(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(raw) => match serde_json::from_str(raw) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                error!("Malformed `blobber_files` buildbot property: {} ({})", raw, e);
                None
            }
        },
        other => Some(other.clone()),
    }
}

/// Seconds since the epoch for a buildid.
///
/// Buildids are usually compact timestamps (`20240101123045`); ISO-style
/// date/time strings are accepted too. Times without an offset are UTC.
pub fn buildid_to_epoch(buildid: &str) -> Result<i64> {
    let trimmed = buildid.trim();

    for format in ["%Y%m%d%H%M%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp());
    }

    for format in ["%Y%m%d", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight.and_utc().timestamp());
            }
        }
    }

    Err(Error::InvalidBuildId {
        buildid: buildid.to_string(),
        reason: "not a recognizable date".to_string(),
    })
}
