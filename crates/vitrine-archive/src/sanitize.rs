//! Container entry name sanitization.
//!
//! Every name that crosses the container boundary, in either direction,
//! goes through [`sanitize_name`]. Names are checked raw and after up to two
//! rounds of percent-decoding so `%2e%2e/` and `%252e%252e/` cannot smuggle
//! a traversal past the segment check.

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest accepted entry name, in characters.
pub const MAX_NAME_LEN: usize = 255;

static SAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-./]+$").unwrap());

/// Why a name was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    Empty,
    TooLong(usize),
    NullByte,
    Traversal,
    Absolute,
    Hidden,
    InvalidCharacter(char),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("name is empty"),
            Self::TooLong(len) => write!(f, "name is {len} characters, limit is {MAX_NAME_LEN}"),
            Self::NullByte => f.write_str("name contains a null byte"),
            Self::Traversal => f.write_str("name contains a '..' segment"),
            Self::Absolute => f.write_str("name is an absolute path"),
            Self::Hidden => f.write_str("name starts with '.'"),
            Self::InvalidCharacter(c) => write!(f, "character {c:?} is not allowed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsafe entry name {name:?}: {violation}")]
pub struct FilenameSecurityError {
    pub name: String,
    pub violation: Violation,
}

impl FilenameSecurityError {
    fn new(name: &str, violation: Violation) -> Self {
        Self {
            name: name.to_string(),
            violation,
        }
    }
}

/// Validate `raw` and return its normalized form.
///
/// Normalization only drops empty and `.` segments; anything that would need
/// real rewriting is refused instead.
pub fn sanitize_name(raw: &str) -> Result<String, FilenameSecurityError> {
    let fail = |violation| Err(FilenameSecurityError::new(raw, violation));

    if raw.is_empty() {
        return fail(Violation::Empty);
    }
    let len = raw.chars().count();
    if len > MAX_NAME_LEN {
        return fail(Violation::TooLong(len));
    }
    if raw.contains('\0') {
        return fail(Violation::NullByte);
    }

    let once = percent_decode(raw);
    let twice = percent_decode(&once);
    for form in [raw, once.as_ref(), twice.as_ref()] {
        if form.contains('\0') {
            return fail(Violation::NullByte);
        }
        if has_parent_segment(form) {
            return fail(Violation::Traversal);
        }
        if form.starts_with('/') || form.starts_with('\\') {
            return fail(Violation::Absolute);
        }
    }

    if raw.starts_with('.') {
        return fail(Violation::Hidden);
    }
    if !SAFE_NAME.is_match(raw) {
        let bad = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')))
            .unwrap_or('?');
        return fail(Violation::InvalidCharacter(bad));
    }

    let normalized = raw
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if normalized.is_empty() {
        return fail(Violation::Empty);
    }
    Ok(normalized)
}

/// Convenience predicate over [`sanitize_name`].
pub fn is_safe_name(raw: &str) -> bool {
    sanitize_name(raw).is_ok()
}

fn percent_decode(s: &str) -> Cow<'_, str> {
    match urlencoding::decode_binary(s.as_bytes()) {
        Cow::Borrowed(_) => Cow::Borrowed(s),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn has_parent_segment(s: &str) -> bool {
    s.split(['/', '\\']).any(|segment| segment == "..")
}
