use std::cmp::Ordering;
use std::fmt;

use crate::core::error::{CoreError, CoreResult};

/// A lenient, semver-like ordering key.
///
/// Supported shapes:
///   `1.20`, `1.20.4`
///   `1.21-pre.1`, `1.0.0-alpha.23.45.a`
///   `1.20.4+build.7` (build metadata is kept for display, ignored for ordering)
///
/// Missing release components compare as zero, so `1.20` and `1.20.0` are
/// equal keys. A pre-release sorts before the plain release.
#[derive(Debug, Clone)]
pub struct SemanticKey {
    raw: String,
    release: Vec<Identifier>,
    pre: Vec<Identifier>,
}

/// Numeric identifiers sort before alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl Identifier {
    fn parse(part: &str, raw: &str) -> CoreResult<Self> {
        if part.is_empty() {
            return Err(CoreError::InvalidVersion {
                id: raw.to_string(),
                reason: "empty version component".into(),
            });
        }
        Ok(match part.parse::<u64>() {
            Ok(n) => Identifier::Numeric(n),
            Err(_) => Identifier::Alpha(part.to_string()),
        })
    }
}

impl SemanticKey {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidVersion {
                id: raw.to_string(),
                reason: "empty semantic version".into(),
            });
        }

        // Build metadata never takes part in ordering
        let without_build = trimmed.split_once('+').map_or(trimmed, |(v, _)| v);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };

        let release = core
            .split('.')
            .map(|p| Identifier::parse(p, trimmed))
            .collect::<CoreResult<Vec<_>>>()?;
        let pre = match pre {
            Some(p) => p
                .split('.')
                .map(|p| Identifier::parse(p, trimmed))
                .collect::<CoreResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            raw: trimmed.to_string(),
            release,
            pre,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_pre_release(&self) -> bool {
        !self.pre.is_empty()
    }

    fn release_component(&self, index: usize) -> &Identifier {
        static ZERO: Identifier = Identifier::Numeric(0);
        self.release.get(index).unwrap_or(&ZERO)
    }
}

impl Ord for SemanticKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.release.len().max(other.release.len());
        for i in 0..width {
            match self.release_component(i).cmp(other.release_component(i)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl PartialOrd for SemanticKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticKey {}

impl fmt::Display for SemanticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
