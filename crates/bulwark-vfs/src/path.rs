use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{SandboxError, SandboxResult};

/// A normalized absolute path inside a sandbox.
///
/// Always starts with `/`, has no empty or `.` segments, and never contains a
/// `..` that climbs above the virtual root. The root itself is `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The virtual root, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Lexically normalize `raw`.
    ///
    /// Does NOT touch any backend; purely computational.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` if `raw` is not absolute, contains a
    /// NUL byte or backslash, or uses `..` to climb above the root.
    pub fn parse(raw: &str) -> SandboxResult<Self> {
        if !raw.starts_with('/') {
            return Err(SandboxError::invalid(raw, "path must be absolute (start with '/')"));
        }
        if raw.contains('\0') {
            return Err(SandboxError::invalid(raw, "path contains a NUL byte"));
        }
        if raw.contains('\\') {
            return Err(SandboxError::invalid(raw, "path contains a backslash"));
        }

        let mut stack: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {},
                ".." => {
                    // Popping past the root is a traversal attack, never clamped.
                    if stack.pop().is_none() {
                        return Err(SandboxError::invalid(raw, "path escape attempt"));
                    }
                },
                other => stack.push(other),
            }
        }

        if stack.is_empty() {
            return Ok(Self::root());
        }
        let mut normalized = String::with_capacity(raw.len());
        for segment in stack {
            normalized.push('/');
            normalized.push_str(segment);
        }
        Ok(Self(normalized))
    }

    /// The normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the virtual root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments, root yields none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The final segment, `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// The parent directory, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_owned())),
        }
    }

    /// Whether `self` equals `prefix` or lies beneath it.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        strip_prefix(&self.0, &prefix.0).is_some()
    }

    /// Join a relative remainder onto this path and normalize the result.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` if the joined path escapes the root.
    pub fn join(&self, rest: &str) -> SandboxResult<Self> {
        Self::parse(&format!("{}/{rest}", self.0))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = SandboxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VirtualPath> for String {
    fn from(value: VirtualPath) -> Self {
        value.0
    }
}

/// Strip a normalized `prefix` from a normalized `path`.
///
/// Returns the remainder (empty, or starting with `/`) when `path` equals
/// `prefix` or lies beneath it on a segment boundary. `/ab` is not beneath `/a`.
pub(crate) fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(if path == "/" { "" } else { path });
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Join a concrete base location and a virtual remainder, collapsing duplicate
/// separators and any trailing slash.
pub(crate) fn join_real(base: &str, rest: &str) -> String {
    let mut out = String::with_capacity(base.len().saturating_add(rest.len()).saturating_add(1));
    for segment in base.split('/').chain(rest.split('/')) {
        if segment.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(VirtualPath::parse("/a/b/c.txt").unwrap().as_str(), "/a/b/c.txt");
        assert_eq!(VirtualPath::parse("/a//b/./c/").unwrap().as_str(), "/a/b/c");
        assert_eq!(VirtualPath::parse("/a/b/../c").unwrap().as_str(), "/a/c");
        assert_eq!(VirtualPath::parse("/").unwrap().as_str(), "/");
        assert_eq!(VirtualPath::parse("/a/..").unwrap().as_str(), "/");
    }

    #[test]
    fn test_relative_rejected() {
        let err = VirtualPath::parse("a/b").unwrap_err();
        assert!(matches!(err, SandboxError::InvalidPath { .. }));
        assert!(VirtualPath::parse("").is_err());
    }

    #[test]
    fn test_traversal_blocked() {
        let err = VirtualPath::parse("/../etc/passwd").unwrap_err();
        assert_eq!(
            err,
            SandboxError::InvalidPath {
                path: "/../etc/passwd".into(),
                reason: "path escape attempt".into(),
            }
        );
        assert!(VirtualPath::parse("/a/../../b").is_err());
    }

    #[test]
    fn test_nul_and_backslash_rejected() {
        assert!(VirtualPath::parse("/a\0b").is_err());
        assert!(VirtualPath::parse("/a\\..\\b").is_err());
    }

    #[test]
    fn test_parent_and_file_name() {
        let p = VirtualPath::parse("/a/b/c.txt").unwrap();
        assert_eq!(p.file_name(), Some("c.txt"));
        assert_eq!(p.parent().unwrap().as_str(), "/a/b");
        assert_eq!(VirtualPath::parse("/a").unwrap().parent().unwrap(), VirtualPath::root());
        assert!(VirtualPath::root().parent().is_none());
        assert!(VirtualPath::root().file_name().is_none());
    }

    #[test]
    fn test_starts_with_respects_segments() {
        let a = VirtualPath::parse("/a").unwrap();
        assert!(VirtualPath::parse("/a/b").unwrap().starts_with(&a));
        assert!(VirtualPath::parse("/a").unwrap().starts_with(&a));
        assert!(!VirtualPath::parse("/ab").unwrap().starts_with(&a));
        assert!(a.starts_with(&VirtualPath::root()));
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("/a/b", "/a"), Some("/b"));
        assert_eq!(strip_prefix("/a", "/a"), Some(""));
        assert_eq!(strip_prefix("/ab", "/a"), None);
        assert_eq!(strip_prefix("/a", "/"), Some("/a"));
        assert_eq!(strip_prefix("/", "/"), Some(""));
    }

    #[test]
    fn test_join_real_collapses() {
        assert_eq!(join_real("/proj/", "/out.md"), "/proj/out.md");
        assert_eq!(join_real("/proj", ""), "/proj");
        assert_eq!(join_real("//data//", "/x//y/"), "/data/x/y");
        assert_eq!(join_real("/", ""), "/");
    }

    #[test]
    fn test_serde_validates() {
        let ok: VirtualPath = serde_json::from_str("\"/a/./b\"").unwrap();
        assert_eq!(ok.as_str(), "/a/b");
        assert!(serde_json::from_str::<VirtualPath>("\"/../x\"").is_err());
    }

    fn raw_path() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                Just(String::new()),
                Just(".".to_owned()),
                Just("..".to_owned()),
                "[a-z]{1,4}",
            ],
            0..8,
        )
        .prop_map(|segments| format!("/{}", segments.join("/")))
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(raw in raw_path()) {
            if let Ok(once) = VirtualPath::parse(&raw) {
                let twice = VirtualPath::parse(once.as_str()).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        #[test]
        fn prop_normalized_has_no_dot_segments(raw in raw_path()) {
            if let Ok(p) = VirtualPath::parse(&raw) {
                prop_assert!(p.as_str().starts_with('/'));
                prop_assert!(p.segments().all(|s| s != ".." && s != "." && !s.is_empty()));
            }
        }

        #[test]
        fn prop_leading_parent_always_escapes(depth in 1usize..4, tail in "[a-z]{1,4}") {
            let raw = format!("/{}{}", "../".repeat(depth), tail);
            prop_assert!(VirtualPath::parse(&raw).is_err());
        }
    }
}
