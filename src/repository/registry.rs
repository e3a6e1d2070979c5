use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::error::PackageError;
use crate::runtime::Runtime;

use super::{
    DEFAULT_REPOSITORY_NAME, DEFAULT_REPOSITORY_URL, MAX_PRIORITY, RepositoryEntry, select,
};

/// The persisted, priority-ordered list of package sources.
///
/// Every call re-reads the whole store and every mutation rewrites it.
/// There is no locking: two processes mutating at once can lose an update.
pub struct RepositoryRegistry<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
}

impl<'a, R: Runtime> RepositoryRegistry<'a, R> {
    pub fn new(runtime: &'a R, path: PathBuf) -> Self {
        Self { runtime, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a new source.
    #[tracing::instrument(skip(self))]
    pub fn add(&self, name: &str, url: &str, priority: u8, trusted: bool) -> Result<RepositoryEntry> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() {
            return Err(PackageError::InvalidArgument("repository name is empty".into()).into());
        }
        if url.is_empty() {
            return Err(PackageError::InvalidArgument("repository url is empty".into()).into());
        }
        check_priority(priority)?;

        let mut entries = self.load()?;
        if entries.iter().any(|e| e.has_name(name)) {
            return Err(PackageError::DuplicateName(name.to_string()).into());
        }

        let entry = RepositoryEntry {
            name: name.to_string(),
            url: url.to_string(),
            priority,
            trusted,
        };
        entries.push(entry.clone());
        self.store(entries)?;

        info!("Registered repository {} ({})", entry.name, entry.url);
        Ok(entry)
    }

    /// Change the given fields of an existing source; `None` keeps the current value.
    #[tracing::instrument(skip(self))]
    pub fn update(
        &self,
        name: &str,
        url: Option<&str>,
        priority: Option<u8>,
        trusted: Option<bool>,
    ) -> Result<RepositoryEntry> {
        let mut entries = self.load()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.has_name(name))
            .ok_or_else(|| PackageError::RepositoryNotFound(name.to_string()))?;

        if let Some(url) = url {
            let url = url.trim();
            if url.is_empty() {
                return Err(PackageError::InvalidArgument("repository url is empty".into()).into());
            }
            entry.url = url.to_string();
        }
        if let Some(priority) = priority {
            check_priority(priority)?;
            entry.priority = priority;
        }
        if let Some(trusted) = trusted {
            entry.trusted = trusted;
        }

        let updated = entry.clone();
        self.store(entries)?;
        Ok(updated)
    }

    /// Remove sources by name, one at a time. Stops at the first name that
    /// is not registered; earlier removals stay persisted.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, names: &[String]) -> Result<()> {
        for name in names {
            let mut entries = self.load()?;
            let before = entries.len();
            entries.retain(|e| !e.has_name(name));
            if entries.len() == before {
                return Err(PackageError::RepositoryNotFound(name.clone()).into());
            }
            self.store(entries)?;
            info!("Removed repository {}", name);
        }
        Ok(())
    }

    /// Registered sources matching `names` (exact names, else glob patterns,
    /// case-insensitive), ordered by priority then name. Names matching
    /// nothing are skipped.
    pub fn list(&self, names: &[String]) -> Result<Vec<RepositoryEntry>> {
        let all = self.load()?;
        let mut entries: Vec<RepositoryEntry> = select(&all, names).cloned().collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Read and parse the whole store, seeding it with the default source
    /// when it does not exist yet.
    #[tracing::instrument(skip(self))]
    fn load(&self) -> Result<Vec<RepositoryEntry>> {
        if !self.runtime.exists(&self.path) {
            debug!("No repository store at {:?}, seeding default", self.path);
            let seed = vec![RepositoryEntry {
                name: DEFAULT_REPOSITORY_NAME.to_string(),
                url: DEFAULT_REPOSITORY_URL.to_string(),
                priority: MAX_PRIORITY,
                trusted: false,
            }];
            self.store(seed.clone())?;
            return Ok(seed);
        }

        let content = self.runtime.read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse repository store {:?}", self.path))
    }

    /// Rewrite the whole store through a temporary sibling file.
    fn store(&self, mut entries: Vec<RepositoryEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }

        sort_entries(&mut entries);
        let content = serde_json::to_string_pretty(&entries)?;

        let tmp = self.path.with_extension("json.tmp");
        self.runtime
            .write(&tmp, content.as_bytes())
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        self.runtime
            .rename(&tmp, &self.path)
            .with_context(|| format!("Failed to save repository store {:?}", self.path))
    }
}

fn check_priority(priority: u8) -> Result<()> {
    if priority > MAX_PRIORITY {
        return Err(PackageError::InvalidArgument(format!(
            "priority {} is outside 0..={}",
            priority, MAX_PRIORITY
        ))
        .into());
    }
    Ok(())
}

fn sort_entries(entries: &mut [RepositoryEntry]) {
    entries.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()))
    });
}
