//! Wildcard path matching.
//!
//! # Responsibilities
//! - Match request paths against configured path patterns
//! - Reject traversal attempts and malformed segments before matching
//! - Compile wildcard patterns once per configuration load
//!
//! # Design Decisions
//! - Only `*` is special; it matches one or more characters, never an empty segment
//! - Character sets are restricted so the matcher is not a general regex engine
//! - Trailing slashes are insignificant on both sides, except `/*` also matches `/`
//! - Case-sensitive; invalid input is a non-match, never an error

use regex::Regex;

const WILDCARD: char = '*';

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// No wildcard: exact comparison after normalization.
    Exact(String),
    /// Anchored regex built from a wildcard pattern.
    Wildcard(Regex),
    /// Pattern failed the safety checks and never matches.
    Rejected,
}

impl PathPattern {
    /// Compile a pattern. Unsafe patterns compile to a pattern that never matches.
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let kind = compile(&raw);
        if matches!(kind, PatternKind::Rejected) {
            tracing::debug!(pattern = %raw, "Path pattern rejected, it will never match");
        }
        Self { raw, kind }
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        if has_security_risk(path) {
            return false;
        }

        if let PatternKind::Rejected = self.kind {
            return false;
        }

        // `/*` covers the root itself.
        if path == "/" && self.raw == "/*" {
            return true;
        }

        let path = normalize_trailing_slash(path);
        if !path.chars().all(is_valid_path_char) {
            return false;
        }

        match &self.kind {
            PatternKind::Exact(expected) => path == expected,
            PatternKind::Wildcard(re) => re.is_match(path),
            PatternKind::Rejected => false,
        }
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// Returns true if `path` matches `pattern`.
pub fn matches(path: &str, pattern: &str) -> bool {
    PathPattern::new(pattern).matches(path)
}

/// Returns true if `path` matches any of `patterns`.
pub fn exists_in_set<S: AsRef<str>>(path: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| matches(path, p.as_ref()))
}

fn compile(raw: &str) -> PatternKind {
    if has_security_risk(raw) {
        return PatternKind::Rejected;
    }

    let normalized = normalize_trailing_slash(raw);
    if !normalized.chars().all(is_valid_pattern_char) {
        return PatternKind::Rejected;
    }

    if !normalized.contains(WILDCARD) {
        return PatternKind::Exact(normalized.to_string());
    }

    // Escape first, then turn the escaped wildcard into "one or more of anything".
    let escaped = regex::escape(normalized).replace(r"\*", ".+");
    match Regex::new(&format!("^{}$", escaped)) {
        Ok(re) => PatternKind::Wildcard(re),
        Err(e) => {
            tracing::warn!(pattern = %raw, error = %e, "Failed to compile path pattern");
            PatternKind::Rejected
        }
    }
}

fn has_security_risk(s: &str) -> bool {
    s.contains("..") || s.contains("//")
}

fn normalize_trailing_slash(s: &str) -> &str {
    s.strip_suffix('/').unwrap_or(s)
}

fn is_valid_path_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '/' | '-' | '_' | '.' | '%')
}

fn is_valid_pattern_char(ch: char) -> bool {
    is_valid_path_char(ch) || ch == WILDCARD
}
