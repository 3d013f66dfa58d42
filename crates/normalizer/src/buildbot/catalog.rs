//! Static knowledge about buildbot platforms, OS labels and build tags.

use once_cell::sync::Lazy;
use regex::Regex;

/// Build type tokens, in the order they are looked for inside labels.
pub const BUILDTYPES: [&str; 3] = ["opt", "debug", "pgo"];

/// Canonical platform ids and the OS labels test jobs report for them.
pub const PLATFORMS: &[(&str, &[&str])] = &[
    ("emulator", &["emulator", "ubuntu64_vm-b2g-emulator"]),
    ("emulator-kk", &["emulator-kk"]),
    ("emulator-jb", &["emulator-jb"]),
    ("linux64-asan", &["linux64-asan", "ubuntu64-asan_vm"]),
    ("linux32_gecko", &["linux32_gecko", "ubuntu32_vm-b2gdt"]),
    ("linux64_gecko", &["linux64_gecko", "ubuntu64_vm-b2gdt"]),
    ("linux64-rpm", &["fedora64"]),
    ("linux64", &["fedora64", "ubuntu64", "ubuntu64_hw", "ubuntu64_vm"]),
    ("linux64-mulet", &["linux64-mulet", "ubuntu64_vm-mulet"]),
    ("linuxqt", &["fedora"]),
    ("linux-rpm", &["fedora"]),
    ("linux", &["fedora", "linux", "ubuntu32", "ubuntu32_vm", "ubuntu32_hw"]),
    ("win32", &["xp", "win7", "win8", "win7-ix", "xp-ix"]),
    ("win32_gecko", &["win32_gecko"]),
    ("win32-mulet", &["win32-mulet"]),
    ("win64", &["w764", "win8_64"]),
    (
        "macosx64",
        &["macosx64", "snowleopard", "leopard", "lion", "mountainlion", "yosemite"],
    ),
    ("macosx64_gecko", &["macosx64_gecko", "mountainlion-b2gdt"]),
    ("macosx64-mulet", &["macosx64-mulet"]),
    ("macosx", &["macosx", "leopard"]),
    (
        "android-armv6",
        &["ubuntu64_vm_armv6_mobile", "ubuntu64_vm_armv6_large"],
    ),
    ("android-x86", &["android-x86", "ubuntu64_hw"]),
    (
        "android",
        &["panda_android", "ubuntu64_vm_mobile", "ubuntu64_vm_large"],
    ),
    ("android-api-9", &["ubuntu64_vm_mobile", "ubuntu64_vm_large"]),
    ("android-api-10", &["panda_android"]),
    (
        "android-api-11",
        &[
            "panda_android",
            "ubuntu64_vm_armv7_large",
            "ubuntu64_vm_armv7_mobile",
        ],
    ),
    ("ics_armv7a_gecko", &["ubuntu64-b2g"]),
];

/// Platforms that are dropped without error.
pub const IGNORED_PLATFORMS: &[&str] = &[
    "linux64-br-haz",
    "linux64-sh-haz",
    "linux64-st-an",
    "android-noion",
];

/// Acceptable build tags. The empty tag covers keys with no tag suffix.
pub const TAGS: &[&str] = &[
    "",
    "build",
    "dep",
    "dtrace",
    "l10n",
    "nightly",
    "nomethodjit",
    "notracejit",
    "release",
    "shark",
    "spidermonkey",
    "valgrind",
    "warnaserr",
    "warnaserrdebug",
    "xulrunner",
];

/// How a raw OS label from a routing key is turned into a catalog OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsConversion {
    /// Replace the label with a fixed OS.
    Rename(&'static str),
    /// Read the OS version out of the builder name.
    FromBuilderName,
}

impl OsConversion {
    /// Apply the conversion. `builder_name` is the `buildername` property.
    pub fn apply(&self, builder_name: &str) -> String {
        match self {
            Self::Rename(target) => target.to_string(),
            Self::FromBuilderName => os_from_builder_name(builder_name).to_string(),
        }
    }
}

/// Conversion rule for an OS label, if it needs one.
pub fn os_conversion(label: &str) -> Option<OsConversion> {
    match label {
        "leopard-o" => Some(OsConversion::Rename("leopard")),
        "tegra_android-o" => Some(OsConversion::Rename("tegra_android")),
        "macosx" | "macosx64" | "win32" => Some(OsConversion::FromBuilderName),
        _ => None,
    }
}

static BUILDER_OS_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)OS\s*X\s*10\.5", "leopard"),
        (r"(?i)OS\s*X\s*10\.6", "snowleopard"),
        (r"(?i)OS\s*X\s*10\.7", "lion"),
        (r"(?i)OS\s*X\s*10\.8", "mountainlion"),
        (r"(?i)WINNT\s*5\.2", "xp"),
    ]
    .into_iter()
    .filter_map(|(pattern, os)| Regex::new(pattern).ok().map(|re| (re, os)))
    .collect()
});

/// OS named by a builder name such as `"Rev4 MacOSX Lion 10.7 mozilla-central debug test"`.
pub fn os_from_builder_name(builder_name: &str) -> &'static str {
    BUILDER_OS_RULES
        .iter()
        .find(|(re, _)| re.is_match(builder_name))
        .map(|(_, os)| *os)
        .unwrap_or("unknown")
}

/// OS labels accepted for a platform.
pub fn os_synonyms(platform: &str) -> Option<&'static [&'static str]> {
    PLATFORMS
        .iter()
        .find(|(id, _)| *id == platform)
        .map(|(_, oses)| *oses)
}

pub fn is_known_platform(platform: &str) -> bool {
    os_synonyms(platform).is_some()
}

pub fn is_ignored_platform(platform: &str) -> bool {
    IGNORED_PLATFORMS.contains(&platform)
}

pub fn is_valid_os(platform: &str, os: &str) -> bool {
    os_synonyms(platform).is_some_and(|oses| oses.contains(&os))
}

pub fn is_known_tag(tag: &str) -> bool {
    TAGS.contains(&tag)
}

static PLATFORMS_MOST_SPECIFIC_FIRST: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut ids: Vec<&'static str> = PLATFORMS.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids
});

/// Guess the platform from a builder name or routing key.
///
/// Platform ids are tried in reverse lexical order so `linux64-asan` wins
/// over `linux64`, which wins over `linux`. When no id matches, the first
/// platform owning a matching OS label is returned.
pub fn guess_platform(builder: &str) -> Option<&'static str> {
    if let Some(id) = PLATFORMS_MOST_SPECIFIC_FIRST
        .iter()
        .find(|id| builder.contains(**id))
    {
        return Some(*id);
    }

    PLATFORMS
        .iter()
        .find(|(_, oses)| oses.iter().any(|os| builder.contains(os)))
        .map(|(id, _)| *id)
}

/// Cut a stage platform label at the first build type token it carries,
/// dropping the separator in front of it: `linux64-debug` becomes `linux64`.
pub fn strip_buildtype(label: &str) -> String {
    let mut stripped = label.to_string();
    for buildtype in BUILDTYPES {
        if let Some(idx) = stripped.find(buildtype) {
            stripped.truncate(idx.saturating_sub(1));
        }
    }
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_prefers_most_specific_platform() {
        assert_eq!(
            guess_platform("build.mozilla-central-linux64-asan-debug.5.log_uploaded"),
            Some("linux64-asan")
        );
        assert_eq!(
            guess_platform("build.mozilla-central-linux64.5.log_uploaded"),
            Some("linux64")
        );
        assert_eq!(
            guess_platform("build.mozilla-central-linux.5.log_uploaded"),
            Some("linux")
        );
        assert_eq!(
            guess_platform("build.mozilla-central-macosx64_gecko.5.log_uploaded"),
            Some("macosx64_gecko")
        );
    }

    #[test]
    fn test_guess_is_deterministic() {
        let builder = "Ubuntu VM 12.04 x64 mozilla-inbound debug test mochitest-1 linux64-mulet";
        let first = guess_platform(builder);
        for _ in 0..10 {
            assert_eq!(guess_platform(builder), first);
        }
        assert_eq!(first, Some("linux64-mulet"));
    }

    #[test]
    fn test_guess_falls_back_to_os_labels() {
        assert_eq!(guess_platform("Windows XP 32-bit xp-ix"), Some("win32"));
        assert_eq!(guess_platform("Rev5 snowleopard talos"), Some("macosx64"));
        assert_eq!(guess_platform("nothing recognizable"), None);
    }

    #[test]
    fn test_os_conversions() {
        assert_eq!(
            os_conversion("leopard-o").map(|c| c.apply("")),
            Some("leopard".to_string())
        );
        assert_eq!(
            os_conversion("macosx64").map(|c| c.apply("Rev4 MacOSX Lion 10.7 mozilla-central")),
            Some("unknown".to_string())
        );
        assert_eq!(
            os_conversion("macosx64").map(|c| c.apply("Rev4 MacOSX OS X 10.7 mozilla-central")),
            Some("lion".to_string())
        );
        assert_eq!(
            os_conversion("win32").map(|c| c.apply("Windows WINNT 5.2 try opt test")),
            Some("xp".to_string())
        );
        assert_eq!(os_conversion("ubuntu64_vm"), None);
    }

    #[test]
    fn test_os_from_builder_name_is_case_insensitive() {
        assert_eq!(os_from_builder_name("rev3 os x 10.6 try"), "snowleopard");
        assert_eq!(os_from_builder_name("OSX10.8"), "mountainlion");
        assert_eq!(os_from_builder_name("fedora"), "unknown");
    }

    #[test]
    fn test_lookups() {
        assert!(is_known_platform("linux64"));
        assert!(!is_known_platform("beos"));
        assert!(is_valid_os("win32", "win7"));
        assert!(!is_valid_os("win32", "fedora"));
        assert!(is_known_tag("l10n"));
        assert!(is_known_tag(""));
        assert!(!is_known_tag("bogus"));
        assert!(is_ignored_platform("linux64-br-haz"));
    }

    #[test]
    fn test_strip_buildtype() {
        assert_eq!(strip_buildtype("linux64-debug"), "linux64");
        assert_eq!(strip_buildtype("win32-pgo"), "win32");
        assert_eq!(strip_buildtype("android-api-11"), "android-api-11");
    }
}
