//! Staged installation of a resolved package set from one source.
//!
//! Each package moves through staging, download, the license and clobber
//! checks, the metadata write and the commit. A package that fails is
//! abandoned with its staging directory removed; the rest of the set carries
//! on. Nothing already committed is rolled back.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::error::PackageError;
use crate::package::{
    CapabilityIndex, InstallLayout, InstallRequest, InstalledPackageRecord, InstalledQuery,
    MODULE_RECORD_FILE, PackageIdentity, PackageInfo, PackageType, script_file_name,
};
use crate::repository::RepositoryEntry;
use crate::resolver::{ResolveOptions, ResolvedPackage, ResolvedSet};
use crate::runtime::Runtime;
use crate::source::SourceClient;

/// Directory under the system temp dir holding per-package staging dirs.
pub const STAGING_DIR: &str = "modget-staging";

const LICENSE_FILE: &str = "License.txt";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub prerelease: bool,
    /// Install even when the version is already present.
    pub reinstall: bool,
    /// Use untrusted sources without asking.
    pub force: bool,
    pub trust_repository: bool,
    /// Refuse packages whose commands collide with installed packages.
    pub no_clobber: bool,
    pub accept_license: bool,
    pub skip_dependency_check: bool,
    /// Saving to a directory: no license prompt, no installed short-circuit.
    pub save_mode: bool,
}

impl InstallOptions {
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            prerelease: self.prerelease,
            reinstall: self.reinstall || self.save_mode,
            skip_dependency_check: self.skip_dependency_check,
        }
    }
}

/// A package that could not be installed, and why.
#[derive(Debug)]
pub struct PackageFailure {
    pub identity: PackageIdentity,
    pub error: anyhow::Error,
}

/// What one transaction did.
#[derive(Debug, Default)]
pub struct TransactionOutcome {
    pub committed: Vec<PackageIdentity>,
    pub already_installed: Vec<PackageIdentity>,
    pub failures: Vec<PackageFailure>,
    /// Requested packages not committed, plus failed dependencies with the
    /// range they were needed at.
    pub unsatisfied: Vec<InstallRequest>,
}

pub struct InstallTransaction<'a, R: Runtime, S: SourceClient + ?Sized, Q: InstalledQuery + ?Sized> {
    runtime: &'a R,
    source: &'a S,
    repository: &'a RepositoryEntry,
    layout: &'a InstallLayout,
    installed: &'a Q,
    cleanup: SharedCleanupContext,
}

impl<'a, R: Runtime, S: SourceClient + ?Sized, Q: InstalledQuery + ?Sized>
    InstallTransaction<'a, R, S, Q>
{
    pub fn new(
        runtime: &'a R,
        source: &'a S,
        repository: &'a RepositoryEntry,
        layout: &'a InstallLayout,
        installed: &'a Q,
        cleanup: SharedCleanupContext,
    ) -> Self {
        Self {
            runtime,
            source,
            repository,
            layout,
            installed,
            cleanup,
        }
    }

    /// Install every package of `resolved`, in order.
    #[tracing::instrument(skip(self, resolved), fields(repository = %self.repository.name))]
    pub async fn install(
        &self,
        resolved: &ResolvedSet,
        options: &InstallOptions,
    ) -> TransactionOutcome {
        let mut outcome = TransactionOutcome::default();

        for package in &resolved.packages {
            let identity = package.identity();

            if !options.reinstall && !options.save_mode {
                match self.installed.is_installed(&identity) {
                    Ok(true) => {
                        println!("    present {}", identity);
                        outcome.already_installed.push(identity);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.record_failure(&mut outcome, package, e);
                        continue;
                    }
                }
            }

            match self.install_one(package, options).await {
                Ok(location) => {
                    println!("  installed {} {}", identity, location.display());
                    outcome.committed.push(identity);
                }
                Err(e) => self.record_failure(&mut outcome, package, e),
            }
        }

        outcome
    }

    fn record_failure(
        &self,
        outcome: &mut TransactionOutcome,
        package: &ResolvedPackage,
        error: anyhow::Error,
    ) {
        let identity = package.identity();
        warn!("Failed to install {}: {:#}", package, error);
        println!("     failed {}: {:#}", identity, error);

        outcome.unsatisfied.push(InstallRequest::new(
            package.info.id.clone(),
            package.constraint.clone(),
        ));
        outcome.failures.push(PackageFailure { identity, error });
    }

    /// Stage, check and commit one package. Returns where it landed.
    async fn install_one(
        &self,
        package: &ResolvedPackage,
        options: &InstallOptions,
    ) -> Result<PathBuf> {
        let staging_root = self.runtime.temp_dir().join(STAGING_DIR);
        let prefix = format!("{}-", package.info.id.to_ascii_lowercase());
        let staging = self
            .runtime
            .create_unique_dir(&staging_root, &prefix)
            .context("Failed to create staging directory")?;
        let guard = CleanupGuard::new(self.cleanup.clone(), staging.clone());

        let result = self.stage_and_commit(&package.info, &staging, options).await;

        // A committed module took the staging directory with it
        if self.runtime.exists(guard.path())
            && let Err(e) = self.runtime.remove_dir_all(guard.path())
        {
            warn!("Failed to remove staging directory {:?}: {:#}", guard.path(), e);
        }
        guard.release();

        result
    }

    async fn stage_and_commit(
        &self,
        info: &PackageInfo,
        staging: &Path,
        options: &InstallOptions,
    ) -> Result<PathBuf> {
        let identity = info.identity();

        println!("downloading {}", identity);
        self.source
            .download(info, staging)
            .await
            .with_context(|| format!("Failed to download {}", identity))?;

        if !options.save_mode && info.require_license_acceptance && !options.accept_license {
            self.check_license(info, staging)?;
        }

        if options.no_clobber {
            self.check_clobber(info)?;
        }

        let script = self.find_root_file(staging, &script_file_name(&info.id))?;
        self.remove_packaging_residue(staging)?;

        println!(" installing {}", identity);
        match script {
            None => {
                let destination = self.layout.version_dir(&info.id, &info.version);
                let record = self.record(info, PackageType::Module, destination.clone());
                record.save(self.runtime, &staging.join(MODULE_RECORD_FILE))?;
                self.commit_module(staging, &destination)?;
                Ok(destination)
            }
            Some(script) => {
                let destination = self.layout.script_path(&info.id);
                let record = self.record(
                    info,
                    PackageType::Script,
                    self.layout.scripts_dir().to_path_buf(),
                );
                self.commit_script(&script, &destination)?;
                if let Err(e) = record.save(self.runtime, &self.layout.script_record_path(&info.id)) {
                    // No script without its record
                    if let Err(remove) = self.runtime.remove_file(&destination) {
                        warn!("Failed to remove {:?}: {:#}", destination, remove);
                    }
                    return Err(e.context(format!("Failed to record {}", identity)));
                }
                Ok(destination)
            }
        }
    }

    fn record(
        &self,
        info: &PackageInfo,
        package_type: PackageType,
        install_location: PathBuf,
    ) -> InstalledPackageRecord {
        InstalledPackageRecord::new(
            info,
            &self.repository.name,
            &self.repository.url,
            package_type,
            install_location,
        )
    }

    fn check_license(&self, info: &PackageInfo, staging: &Path) -> Result<()> {
        let identity = info.identity();
        let Some(license) = self.find_root_file(staging, LICENSE_FILE)? else {
            return Err(PackageError::LicenseFileMissing(identity.to_string()).into());
        };

        let text = self
            .runtime
            .read_to_string(&license)
            .with_context(|| format!("Failed to read license of {}", identity))?;
        println!("License for {}:\n\n{}\n", identity, text.trim_end());

        if !self
            .runtime
            .confirm(&format!("Do you accept the license of {}? [y/N] ", identity))?
        {
            return Err(PackageError::LicenseDeclined(identity.to_string()).into());
        }
        Ok(())
    }

    fn check_clobber(&self, info: &PackageInfo) -> Result<()> {
        let capabilities = CapabilityIndex::from_tags(&info.tags);
        if capabilities.is_empty() {
            return Ok(());
        }

        let mut conflicts: Vec<String> = Vec::new();
        for record in self.installed.records()? {
            if record.id.eq_ignore_ascii_case(&info.id) {
                continue;
            }
            let collisions = capabilities.collisions(&record.capabilities);
            if !collisions.is_empty() {
                debug!("{} collides with {} on {:?}", info.id, record.id, collisions);
                if !conflicts.iter().any(|c| c.eq_ignore_ascii_case(&record.id)) {
                    conflicts.push(record.id.clone());
                }
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(PackageError::Clobber {
                package: info.identity().to_string(),
                conflicts,
            }
            .into())
        }
    }

    /// A file directly under `dir` named `name`, ignoring case.
    fn find_root_file(&self, dir: &Path, name: &str) -> Result<Option<PathBuf>> {
        Ok(self.runtime.read_dir(dir)?.into_iter().find(|path| {
            !self.runtime.is_dir(path)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
        }))
    }

    /// Drop the packaging side files a `.nupkg` carries next to the content.
    fn remove_packaging_residue(&self, staging: &Path) -> Result<()> {
        for path in self.runtime.read_dir(staging)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = name.to_ascii_lowercase();

            if self.runtime.is_dir(&path) {
                if name == "_rels" || name == "package" {
                    debug!("Removing packaging directory {:?}", path);
                    self.runtime.remove_dir_all(&path)?;
                }
            } else if name == "[content_types].xml"
                || name == ".signature.p7s"
                || name.ends_with(".nuspec")
                || name.ends_with(".nupkg")
                || name.ends_with(".nupkg.sha512")
            {
                debug!("Removing packaging file {:?}", path);
                self.runtime.remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Replace `destination` with the staged tree; other versions stay.
    ///
    /// The tree is first brought next to `destination`, then renamed into
    /// place, so a failed copy never leaves a partial version directory.
    fn commit_module(&self, staging: &Path, destination: &Path) -> Result<()> {
        let incoming = incoming_path(destination);
        if let Some(parent) = incoming.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        if self.runtime.exists(&incoming) {
            self.runtime.remove_dir_all(&incoming)?;
        }

        let guard = CleanupGuard::new(self.cleanup.clone(), incoming.clone());
        let result = self.swap_in(staging, &incoming, destination);

        if self.runtime.exists(guard.path())
            && let Err(e) = self.runtime.remove_dir_all(guard.path())
        {
            warn!("Failed to remove {:?}: {:#}", guard.path(), e);
        }
        guard.release();

        result.with_context(|| format!("Failed to commit to {:?}", destination))
    }

    fn swap_in(&self, staging: &Path, incoming: &Path, destination: &Path) -> Result<()> {
        if let Err(e) = self.runtime.rename(staging, incoming) {
            // Staging and the install root may sit on different filesystems
            debug!("Move failed ({:#}), copying instead", e);
            copy_dir_all(self.runtime, staging, incoming)?;
        }

        if self.runtime.exists(destination) {
            debug!("Replacing {:?}", destination);
            self.runtime
                .remove_dir_all(destination)
                .with_context(|| format!("Failed to remove existing {:?}", destination))?;
        }
        self.runtime.rename(incoming, destination)
    }

    fn commit_script(&self, script: &Path, destination: &Path) -> Result<()> {
        self.runtime.create_dir_all(self.layout.scripts_dir())?;
        self.runtime
            .copy(script, destination)
            .with_context(|| format!("Failed to commit to {:?}", destination))?;
        Ok(())
    }
}

/// `<parent>/.<name>.incoming`, on the same filesystem as `destination`.
fn incoming_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.incoming", name))
}

/// Recursive copy through the runtime.
fn copy_dir_all<R: Runtime>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    runtime.create_dir_all(to)?;
    for entry in runtime.read_dir(from)? {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let target = to.join(name);
        if runtime.is_dir(&entry) {
            copy_dir_all(runtime, &entry, &target)?;
        } else {
            runtime.copy(&entry, &target)?;
        }
    }
    Ok(())
}
