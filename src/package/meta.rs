use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

use super::capability::CapabilityIndex;
use super::identity::{Dependency, PackageIdentity, PackageInfo};
use super::version::PackageVersion;

/// Whether an installed unit is a module directory or a single script.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Module,
    Script,
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageType::Module => write!(f, "module"),
            PackageType::Script => write!(f, "script"),
        }
    }
}

/// Metadata stored next to installed content.
///
/// The presence of this file is what marks a version as installed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstalledPackageRecord {
    pub id: String,
    pub version: PackageVersion,
    pub description: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_name: String,
    pub source_location: String,
    /// RFC 3339 timestamp.
    pub installed_date: String,
    pub package_type: PackageType,
    pub install_location: PathBuf,
    #[serde(default)]
    pub capabilities: CapabilityIndex,
}

impl InstalledPackageRecord {
    pub fn new(
        info: &PackageInfo,
        source_name: &str,
        source_location: &str,
        package_type: PackageType,
        install_location: PathBuf,
    ) -> Self {
        InstalledPackageRecord {
            id: info.id.clone(),
            version: info.version.clone(),
            description: info.description.clone(),
            author: info.authors.clone(),
            dependencies: info.dependencies.clone(),
            tags: info.tags.clone(),
            source_name: source_name.to_string(),
            source_location: source_location.to_string(),
            installed_date: chrono::Utc::now().to_rfc3339(),
            package_type,
            install_location,
            capabilities: CapabilityIndex::from_tags(&info.tags),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    #[tracing::instrument(skip(runtime, path))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let record: InstalledPackageRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse package record {:?}", path))?;
        Ok(record)
    }

    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !runtime.exists(parent)
        {
            runtime.create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        runtime
            .write(path, content.as_bytes())
            .with_context(|| format!("Failed to save package record to {:?}", path))
    }
}
