//! Package versions and version ranges.
//!
//! Versions have one to four numeric components and an optional pre-release
//! label. Ranges use NuGet interval notation (`[1.0,2.0)`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use semver::Prerelease;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PackageError;

/// A package version such as `1.2`, `1.2.3.4` or `2.0.0-beta1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PackageVersion {
    parts: [u64; 4],
    /// Lowercased pre-release label; empty for stable releases.
    pre: Prerelease,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            parts: [major, minor, patch, 0],
            pre: Prerelease::EMPTY,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    pub fn prerelease(&self) -> &str {
        self.pre.as_str()
    }

    /// The numeric part only (`1.2.3` or `1.2.3.4`), used for version directories.
    pub fn numeric(&self) -> String {
        let [major, minor, patch, revision] = self.parts;
        if revision == 0 {
            format!("{}.{}.{}", major, minor, patch)
        } else {
            format!("{}.{}.{}.{}", major, minor, patch, revision)
        }
    }
}

impl FromStr for PackageVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PackageError::InvalidVersion(s.to_string());

        let trimmed = s.trim();
        // Build metadata never takes part in comparisons
        let without_build = trimmed.split_once('+').map_or(trimmed, |(v, _)| v);
        let (numbers, label) = match without_build.split_once('-') {
            Some((numbers, label)) => (numbers, Some(label)),
            None => (without_build, None),
        };

        let components: Vec<&str> = numbers.split('.').collect();
        if components.is_empty() || components.len() > 4 {
            return Err(invalid().into());
        }

        let mut parts = [0u64; 4];
        for (slot, component) in parts.iter_mut().zip(&components) {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid().into());
            }
            *slot = component.parse().map_err(|_| invalid())?;
        }

        let pre = match label {
            Some(label) if label.is_empty() => return Err(invalid().into()),
            Some(label) => Prerelease::new(&label.to_ascii_lowercase()).map_err(|_| invalid())?,
            None => Prerelease::EMPTY,
        };

        Ok(Self { parts, pre })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.numeric())?;
        if self.is_prerelease() {
            write!(f, "-{}", self.pre)?;
        }
        Ok(())
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release sorts above every pre-release of the same number
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One end of a [`VersionRange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: PackageVersion,
    pub inclusive: bool,
}

/// An interval of versions. `None` bounds are open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
}

impl VersionRange {
    /// A range containing exactly one version.
    pub fn exact(version: PackageVersion) -> Self {
        Self {
            min: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            max: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    /// `version` or anything newer.
    pub fn at_least(version: PackageVersion) -> Self {
        Self {
            min: Some(Bound {
                version,
                inclusive: true,
            }),
            max: None,
        }
    }

    /// Parse a range as written in a package manifest.
    ///
    /// A bare version (`1.0`) means "1.0 or newer".
    pub fn parse(s: &str) -> Result<Self> {
        let text = s.trim();
        let invalid = |reason: &str| PackageError::InvalidVersionRange {
            range: s.to_string(),
            reason: reason.to_string(),
        };

        if text.is_empty() {
            return Err(invalid("range is empty").into());
        }

        let first = text.chars().next().unwrap_or_default();
        if first != '[' && first != '(' {
            let version = text
                .parse::<PackageVersion>()
                .map_err(|_| invalid("not a version"))?;
            return Ok(Self::at_least(version));
        }

        let last = text.chars().last().unwrap_or_default();
        if (last != ']' && last != ')') || text.len() < 2 {
            return Err(invalid("missing closing bracket").into());
        }

        let min_inclusive = first == '[';
        let max_inclusive = last == ']';
        let inner = text[1..text.len() - 1].trim();

        let parse_bound = |part: &str, inclusive: bool| -> Result<Option<Bound>> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            let version = part
                .parse::<PackageVersion>()
                .map_err(|_| invalid(&format!("'{}' is not a version", part)))?;
            Ok(Some(Bound { version, inclusive }))
        };

        let range = match inner.split_once(',') {
            None => {
                // "[1.0]" is the only single-element form
                if !(min_inclusive && max_inclusive) {
                    return Err(invalid("a single version must be written as [x]").into());
                }
                let version = parse_bound(inner, true)?
                    .ok_or_else(|| invalid("no version between brackets"))?
                    .version;
                Self::exact(version)
            }
            Some((min, max)) => {
                if max.contains(',') {
                    return Err(invalid("too many commas").into());
                }
                Self {
                    min: parse_bound(min, min_inclusive)?,
                    max: parse_bound(max, max_inclusive)?,
                }
            }
        };

        if range.min.is_none() && range.max.is_none() {
            return Err(invalid("range has no bounds").into());
        }

        if let (Some(min), Some(max)) = (&range.min, &range.max) {
            match min.version.cmp(&max.version) {
                Ordering::Greater => return Err(invalid("minimum is above maximum").into()),
                Ordering::Equal if !(min.inclusive && max.inclusive) => {
                    return Err(invalid("range is empty").into());
                }
                _ => {}
            }
        }

        Ok(range)
    }

    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let above_min = match &self.min {
            Some(bound) if bound.inclusive => version >= &bound.version,
            Some(bound) => version > &bound.version,
            None => true,
        };
        let below_max = match &self.max {
            Some(bound) if bound.inclusive => version <= &bound.version,
            Some(bound) => version < &bound.version,
            None => true,
        };
        above_min && below_max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(min), Some(max)) = (&self.min, &self.max)
            && min.inclusive
            && max.inclusive
            && min.version == max.version
        {
            return write!(f, "[{}]", min.version);
        }

        match &self.min {
            Some(bound) => write!(
                f,
                "{}{}",
                if bound.inclusive { '[' } else { '(' },
                bound.version
            )?,
            None => write!(f, "(")?,
        }
        write!(f, ", ")?;
        match &self.max {
            Some(bound) => write!(
                f,
                "{}{}",
                bound.version,
                if bound.inclusive { ']' } else { ')' }
            ),
            None => write!(f, ")"),
        }
    }
}

/// What a caller asks for: an exact version or a range.
///
/// The absence of a constraint (`Option::None`) means "latest".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Exact(PackageVersion),
    Range(VersionRange),
}

impl VersionConstraint {
    /// Parse a caller-supplied constraint.
    ///
    /// Unlike manifest ranges, a bare version is exact. `*` or an empty string
    /// means no constraint and yields `None`.
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        let text = s.trim();
        if text.is_empty() || text == "*" {
            return Ok(None);
        }
        text.parse().map(Some)
    }

    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        match self {
            VersionConstraint::Exact(exact) => exact == version,
            VersionConstraint::Range(range) => range.satisfies(version),
        }
    }

    /// True when the constraint itself names a pre-release version.
    pub fn mentions_prerelease(&self) -> bool {
        match self {
            VersionConstraint::Exact(v) => v.is_prerelease(),
            VersionConstraint::Range(range) => [&range.min, &range.max]
                .into_iter()
                .flatten()
                .any(|bound| bound.version.is_prerelease()),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.starts_with('[') || text.starts_with('(') {
            VersionRange::parse(text).map(VersionConstraint::Range)
        } else {
            text.parse().map(VersionConstraint::Exact)
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Exact(version) => write!(f, "{}", version),
            VersionConstraint::Range(range) => write!(f, "{}", range),
        }
    }
}

/// Pick the version to install among `candidates`.
///
/// Without a constraint the highest version wins; otherwise the highest
/// version satisfying the constraint.
pub fn select_best<'a, T>(
    candidates: &'a [T],
    constraint: Option<&VersionConstraint>,
    version_of: impl Fn(&T) -> &PackageVersion,
) -> Option<&'a T> {
    candidates
        .iter()
        .filter(|c| constraint.is_none_or(|constraint| constraint.satisfies(version_of(*c))))
        .max_by(|a, b| version_of(*a).cmp(version_of(*b)))
}
