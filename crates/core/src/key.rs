//! Cache identities for expressions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace an expression identity was minted in.
///
/// Synthesized operators and expressions parsed from engine output never
/// share keys, even when their sanitized names coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySpace {
    Synthesized,
    Parsed,
}

impl KeySpace {
    pub fn tag(&self) -> &'static str {
        match self {
            KeySpace::Synthesized => "synth",
            KeySpace::Parsed => "core",
        }
    }
}

/// Longest key spelling used verbatim as a file stem.
pub const MAX_FILE_STEM: usize = 128;
const HASHED_STEM_PREFIX: usize = 96;

/// Stable cache identity of an expression: `<space tag>:<sanitized name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprKey(String);

impl ExprKey {
    pub fn new(space: KeySpace, name: &str) -> Self {
        Self(format!("{}:{}", space.tag(), sanitize_name(name)))
    }

    /// Wraps a key that was already derived elsewhere, e.g. one read back from disk.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system friendly spelling of the key. Injective over keys built
    /// with [`ExprKey::new`] since sanitized names never contain `-`.
    ///
    /// Stems longer than [`MAX_FILE_STEM`] bytes keep a prefix and append a
    /// digest of the whole key, so they are always longer than any verbatim
    /// stem and never collide with one.
    pub fn file_stem(&self) -> String {
        let stem = self.0.replace(':', "-");
        if stem.len() <= MAX_FILE_STEM {
            return stem;
        }
        let mut cut = HASHED_STEM_PREFIX;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        let digest = blake3::hash(self.0.as_bytes());
        format!("{}-{}", &stem[..cut], &digest.to_hex().as_str()[..32])
    }
}

impl fmt::Display for ExprKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases `raw` and collapses every run of non-alphanumeric characters
/// into a single `_`, dropping leading and trailing runs.
///
/// Names made only of symbols (`+`, `*`, `<=`) would sanitize to nothing, so
/// they are spelled out by code point instead (`+` becomes `u2b`).
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut separator = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if separator && !out.is_empty() {
                out.push('_');
            }
            separator = false;
            out.push(c.to_ascii_lowercase());
        } else {
            separator = true;
        }
    }

    if out.is_empty() {
        return raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| format!("u{:x}", c as u32))
            .collect::<Vec<_>>()
            .join("_");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_punctuation_and_case() {
        assert_eq!(sanitize_name("Hello, World!"), "hello_world");
        assert_eq!(sanitize_name("synth:fabs"), "synth_fabs");
        assert_eq!(sanitize_name("--a--b--"), "a_b");
        assert_eq!(sanitize_name("FMA"), sanitize_name("fma"));
    }

    #[test]
    fn symbolic_names_stay_distinct() {
        assert_eq!(sanitize_name("+"), "u2b");
        assert_ne!(sanitize_name("+"), sanitize_name("-"));
        assert_ne!(sanitize_name("<"), sanitize_name("<="));
    }

    #[test]
    fn key_spaces_do_not_collide() {
        let synth = ExprKey::new(KeySpace::Synthesized, "sqrt");
        let parsed = ExprKey::new(KeySpace::Parsed, "sqrt");
        assert_eq!(synth.as_str(), "synth:sqrt");
        assert_eq!(parsed.as_str(), "core:sqrt");
        assert_ne!(synth, parsed);
        assert_eq!(synth.file_stem(), "synth-sqrt");
    }

    #[test]
    fn long_keys_get_bounded_distinct_stems() {
        let body = "x0 ".repeat(150);
        let a = ExprKey::new(KeySpace::Parsed, &format!("{body} a"));
        let b = ExprKey::new(KeySpace::Parsed, &format!("{body} b"));
        assert!(a.as_str().len() > 300);

        let (sa, sb) = (a.file_stem(), b.file_stem());
        assert!(sa.len() <= HASHED_STEM_PREFIX + 33);
        assert!(sa.starts_with("core-x0_x0"));
        assert_ne!(sa, sb);
        assert_eq!(sa, a.file_stem());

        let short = ExprKey::new(KeySpace::Parsed, &"y".repeat(MAX_FILE_STEM - 5));
        assert_eq!(short.file_stem().len(), MAX_FILE_STEM);
        assert!(!short.file_stem().contains(':'));
    }

    #[test]
    fn same_family_names_collide() {
        assert_eq!(
            ExprKey::new(KeySpace::Synthesized, "Log1p"),
            ExprKey::new(KeySpace::Synthesized, "log1p"),
        );
        assert_eq!(
            ExprKey::new(KeySpace::Parsed, "Rump's example"),
            ExprKey::new(KeySpace::Parsed, "rump s example"),
        );
    }
}
