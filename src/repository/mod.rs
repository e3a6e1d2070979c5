//! Registered package sources.

mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::package::matches_any;

pub use registry::RepositoryRegistry;

/// Highest (last searched) priority a source can have.
pub const MAX_PRIORITY: u8 = 50;

pub const DEFAULT_REPOSITORY_NAME: &str = "NuGetGallery";
pub const DEFAULT_REPOSITORY_URL: &str = "https://api.nuget.org/v3/registration5-semver1";

/// A named package source. Lower priority is searched first.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub name: String,
    pub url: String,
    pub priority: u8,
    #[serde(default)]
    pub trusted: bool,
}

impl RepositoryEntry {
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }

    /// True for feeds reached over HTTP.
    pub fn is_remote(&self) -> bool {
        let url = self.url.to_ascii_lowercase();
        url.starts_with("http://") || url.starts_with("https://")
    }
}

/// Entries picked out by `names`. A name equal to a registered one selects
/// only that entry; anything else is a case-insensitive glob. No names
/// selects everything.
pub fn select<'e>(
    entries: &'e [RepositoryEntry],
    names: &'e [String],
) -> impl Iterator<Item = &'e RepositoryEntry> + 'e {
    entries
        .iter()
        .filter(move |entry| names.is_empty() || names.iter().any(|n| picks(entries, n, entry)))
}

fn picks(entries: &[RepositoryEntry], name: &str, entry: &RepositoryEntry) -> bool {
    if entries.iter().any(|e| e.has_name(name)) {
        entry.has_name(name)
    } else {
        matches_any(std::slice::from_ref(&name.to_string()), &entry.name)
    }
}

impl fmt::Display for RepositoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}
