//! Format versioning and the reader-side compatibility policy.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static VERSION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?<major>0|[1-9][0-9]*)\.(?<minor>0|[1-9][0-9]*)$").unwrap());

/// The version this crate reads and writes.
pub const CURRENT_VERSION: FormatVersion = FormatVersion { major: 1, minor: 0 };

/// `major.minor` manifest format version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    pub fn parse(s: &str) -> Result<Self> {
        let caps = VERSION_REGEX
            .captures(s.trim())
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;
        let major = caps["major"]
            .parse()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;
        let minor = caps["minor"]
            .parse()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

impl FromStr for FormatVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// How a reader of [`CURRENT_VERSION`] relates to a manifest's declared version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compatibility {
    Current,
    /// Same major line, written by a newer producer. Read best-effort.
    NewerMinor(FormatVersion),
    OlderMinor(FormatVersion),
    /// Different major line. A reader may refuse; if it proceeds, every
    /// field is treated as optional.
    ForeignMajor(FormatVersion),
    /// Present but not `major.minor`.
    Unrecognized(String),
    Missing,
}

impl Compatibility {
    /// Whether required-field failures should be downgraded to advisories.
    pub fn degrades_to_optional(&self) -> bool {
        matches!(self, Self::ForeignMajor(_) | Self::Unrecognized(_))
    }

    pub fn is_best_effort(&self) -> bool {
        !matches!(self, Self::Current | Self::OlderMinor(_))
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current ({CURRENT_VERSION})"),
            Self::NewerMinor(v) => write!(f, "newer minor version {v}"),
            Self::OlderMinor(v) => write!(f, "older minor version {v}"),
            Self::ForeignMajor(v) => write!(f, "foreign major version {v}"),
            Self::Unrecognized(raw) => write!(f, "unrecognized version '{raw}'"),
            Self::Missing => f.write_str("no format version"),
        }
    }
}

/// Classify a declared format version against [`CURRENT_VERSION`].
pub fn assess(declared: Option<&str>) -> Compatibility {
    let Some(raw) = declared else {
        return Compatibility::Missing;
    };
    let Ok(version) = FormatVersion::parse(raw) else {
        return Compatibility::Unrecognized(raw.to_string());
    };

    if version.major != CURRENT_VERSION.major {
        Compatibility::ForeignMajor(version)
    } else if version.minor > CURRENT_VERSION.minor {
        Compatibility::NewerMinor(version)
    } else if version.minor < CURRENT_VERSION.minor {
        Compatibility::OlderMinor(version)
    } else {
        Compatibility::Current
    }
}
