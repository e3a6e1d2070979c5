//! Package identities and the metadata sources report about them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::version::{PackageVersion, VersionConstraint};

/// Id plus version. Ids compare case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: String,
    pub version: PackageVersion,
}

impl PackageIdentity {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Case-insensitive id comparison.
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// Key used for visited sets and lookups.
    pub fn key(&self) -> (String, PackageVersion) {
        (self.id.to_ascii_lowercase(), self.version.clone())
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.has_id(&other.id) && self.version == other.version
    }
}

impl Eq for PackageIdentity {}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// A dependency as declared by a package manifest.
///
/// The range stays raw text until the resolver parses it, so that a malformed
/// range can be told apart from "no range declared".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl Dependency {
    pub fn new(id: impl Into<String>, range: Option<&str>) -> Self {
        Self {
            id: id.into(),
            range: range.map(String::from),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.range {
            Some(range) => write!(f, "{} {}", self.id, range),
            None => write!(f, "{}", self.id),
        }
    }
}

/// One version of a package as reported by a source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    pub id: String,
    pub version: PackageVersion,
    pub description: Option<String>,
    pub authors: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub require_license_acceptance: bool,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    /// Where the source finds the content (download URL or archive path).
    pub content_location: String,
}

impl PackageInfo {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }
}

/// A request for one package name, optionally constrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub name: String,
    pub constraint: Option<VersionConstraint>,
}

impl InstallRequest {
    pub fn new(name: impl Into<String>, constraint: Option<VersionConstraint>) -> Self {
        Self {
            name: name.into(),
            constraint,
        }
    }
}

impl fmt::Display for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{} {}", self.name, constraint),
            None => write!(f, "{}", self.name),
        }
    }
}
