//! Queries over the install tree.
//!
//! A version counts as installed when its sidecar record exists: module
//! records live inside `<modules>/<Id>/<Version>/`, script records inside
//! `<scripts>/InstalledScriptInfos/`.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::error::PackageError;
use crate::runtime::Runtime;

use super::identity::PackageIdentity;
use super::layout::{InstallLayout, MODULE_RECORD_FILE, SCRIPT_RECORD_SUFFIX};
use super::meta::{InstalledPackageRecord, PackageType};
use super::matches_any;
use super::version::{PackageVersion, VersionConstraint, VersionRange};

/// What the resolver and the transaction need to know about the install tree.
#[cfg_attr(test, mockall::automock)]
pub trait InstalledQuery {
    /// Installed versions of `id` (case-insensitive).
    fn installed_versions(&self, id: &str) -> Result<Vec<PackageVersion>>;

    /// Every installed record.
    fn records(&self) -> Result<Vec<InstalledPackageRecord>>;

    fn is_installed(&self, identity: &PackageIdentity) -> Result<bool> {
        Ok(self
            .installed_versions(&identity.id)?
            .contains(&identity.version))
    }
}

/// Installed packages under one [`InstallLayout`].
pub struct InstalledPackages<'a, R: Runtime> {
    runtime: &'a R,
    layout: InstallLayout,
}

impl<'a, R: Runtime> InstalledPackages<'a, R> {
    pub fn new(runtime: &'a R, layout: InstallLayout) -> Self {
        Self { runtime, layout }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Find every sidecar record path.
    #[tracing::instrument(skip(self))]
    pub fn find_all(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        // <modules>/<id>/<version>/PackageInfo.json
        let modules_dir = self.layout.modules_dir();
        if self.runtime.exists(modules_dir) {
            for package_dir in self.runtime.read_dir(modules_dir)? {
                if !self.runtime.is_dir(&package_dir) {
                    continue;
                }
                for version_dir in self.runtime.read_dir(&package_dir)? {
                    // Half-committed trees are hidden
                    if is_hidden(&version_dir) {
                        continue;
                    }
                    let record = version_dir.join(MODULE_RECORD_FILE);
                    if self.runtime.is_dir(&version_dir) && self.runtime.exists(&record) {
                        paths.push(record);
                    }
                }
            }
        }

        // <scripts>/InstalledScriptInfos/<id>_InstalledScriptInfo.json
        let info_dir = self.layout.script_info_dir();
        if self.runtime.exists(&info_dir) {
            for entry in self.runtime.read_dir(&info_dir)? {
                if entry
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(SCRIPT_RECORD_SUFFIX))
                {
                    paths.push(entry);
                }
            }
        }

        Ok(paths)
    }

    /// Load every readable record together with its sidecar path.
    ///
    /// Unreadable records are logged and skipped.
    pub fn find_all_with_records(&self) -> Result<Vec<(PathBuf, InstalledPackageRecord)>> {
        let paths = self.find_all()?;
        let mut results = Vec::with_capacity(paths.len());

        for path in paths {
            match InstalledPackageRecord::load(self.runtime, &path) {
                Ok(record) => results.push((path, record)),
                Err(e) => warn!("Failed to load package record from {:?}: {}", path, e),
            }
        }

        Ok(results)
    }

    /// Installed records whose id matches one of `names` (glob patterns,
    /// case-insensitive). Sorted by id, then newest version first.
    pub fn list(&self, names: &[String]) -> Result<Vec<InstalledPackageRecord>> {
        let mut records: Vec<InstalledPackageRecord> = self
            .find_all_with_records()?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| matches_any(names, &record.id))
            .collect();

        records.sort_by(|a, b| {
            a.id.to_ascii_lowercase()
                .cmp(&b.id.to_ascii_lowercase())
                .then_with(|| b.version.cmp(&a.version))
        });
        Ok(records)
    }

    /// Remove the installed versions of `name` matching `constraint` (all
    /// versions when `None`).
    ///
    /// Refuses when another installed package depends on a removed version
    /// and no remaining version satisfies that dependency, unless
    /// `skip_dependency_check` is set.
    #[tracing::instrument(skip(self))]
    pub fn uninstall(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        skip_dependency_check: bool,
    ) -> Result<Vec<PackageIdentity>> {
        let all = self.find_all_with_records()?;
        let (targets, remaining): (Vec<_>, Vec<_>) = all.into_iter().partition(|(_, record)| {
            record.id.eq_ignore_ascii_case(name)
                && constraint.is_none_or(|c| c.satisfies(&record.version))
        });

        if targets.is_empty() {
            return Err(PackageError::NotFound {
                name: name.to_string(),
                repository: "installed packages".to_string(),
            }
            .into());
        }

        if !skip_dependency_check {
            let dependents = find_dependents(
                targets.iter().map(|(_, r)| r),
                remaining.iter().map(|(_, r)| r),
            );
            if !dependents.is_empty() {
                return Err(PackageError::DependentPackage {
                    package: name.to_string(),
                    dependents,
                }
                .into());
            }
        }

        let mut removed = Vec::with_capacity(targets.len());
        for (record_path, record) in targets {
            self.remove_record(&record_path, &record)
                .with_context(|| format!("Failed to uninstall {}", record.identity()))?;
            println!("Uninstalled {}", record.identity());
            removed.push(record.identity());
        }
        Ok(removed)
    }

    fn remove_record(&self, record_path: &Path, record: &InstalledPackageRecord) -> Result<()> {
        match record.package_type {
            PackageType::Module => {
                let version_dir = record_path
                    .parent()
                    .context("Package record has no parent directory")?;
                debug!("Removing {:?}", version_dir);
                self.runtime.remove_dir_all(version_dir)?;

                if let Some(package_dir) = version_dir.parent()
                    && self.runtime.read_dir(package_dir)?.is_empty()
                {
                    self.runtime.remove_dir(package_dir)?;
                }
            }
            PackageType::Script => {
                let script = self.layout.script_path(&record.id);
                if self.runtime.exists(&script) {
                    debug!("Removing {:?}", script);
                    self.runtime.remove_file(&script)?;
                }
                self.runtime.remove_file(record_path)?;
            }
        }
        Ok(())
    }
}

impl<R: Runtime> InstalledQuery for InstalledPackages<'_, R> {
    fn installed_versions(&self, id: &str) -> Result<Vec<PackageVersion>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| record.id.eq_ignore_ascii_case(id))
            .map(|record| record.version)
            .collect())
    }

    fn records(&self) -> Result<Vec<InstalledPackageRecord>> {
        Ok(self
            .find_all_with_records()?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Names of `remaining` packages left without a satisfying version of a
/// dependency once `removed` is gone.
fn find_dependents<'r>(
    removed: impl Iterator<Item = &'r InstalledPackageRecord> + Clone,
    remaining: impl Iterator<Item = &'r InstalledPackageRecord> + Clone,
) -> Vec<String> {
    let mut dependents = Vec::new();

    for dependent in remaining.clone() {
        for dependency in &dependent.dependencies {
            // Unparseable ranges are treated as "any version"
            let range = dependency
                .range
                .as_deref()
                .and_then(|r| VersionRange::parse(r).ok());
            let satisfied_by = |record: &InstalledPackageRecord| {
                record.id.eq_ignore_ascii_case(&dependency.id)
                    && range.as_ref().is_none_or(|r| r.satisfies(&record.version))
            };

            let breaks = removed.clone().any(|r| satisfied_by(r))
                && !remaining.clone().any(|r| satisfied_by(r));
            if breaks && !dependents.iter().any(|d: &String| d.eq_ignore_ascii_case(&dependent.id))
            {
                dependents.push(dependent.id.clone());
            }
        }
    }

    dependents.sort_by_key(|d| d.to_ascii_lowercase());
    dependents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::identity::{Dependency, PackageInfo};
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::tempdir;

    fn write_module(layout: &InstallLayout, id: &str, version: &str, deps: &[(&str, &str)]) {
        let info = PackageInfo {
            id: id.into(),
            version: version.parse().unwrap(),
            dependencies: deps
                .iter()
                .map(|(id, range)| Dependency::new(*id, Some(*range)))
                .collect(),
            ..Default::default()
        };
        let dir = layout.version_dir(id, &info.version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.psm1", id)), "").unwrap();
        InstalledPackageRecord::new(&info, "Local", "/feed", PackageType::Module, dir.clone())
            .save(&RealRuntime, &layout.module_record_path(id, &info.version))
            .unwrap();
    }

    fn write_script(layout: &InstallLayout, id: &str, version: &str) {
        let info = PackageInfo {
            id: id.into(),
            version: version.parse().unwrap(),
            ..Default::default()
        };
        std::fs::create_dir_all(layout.scripts_dir()).unwrap();
        std::fs::write(layout.script_path(id), "Write-Output 1").unwrap();
        InstalledPackageRecord::new(
            &info,
            "Local",
            "/feed",
            PackageType::Script,
            layout.script_path(id),
        )
        .save(&RealRuntime, &layout.script_record_path(id))
        .unwrap();
    }

    #[test]
    fn test_find_all_empty_root() {
        let mut runtime = MockRuntime::new();

        // --- Setup ---
        // Neither Modules nor Scripts/InstalledScriptInfos exist
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/root/Modules")))
            .returning(|_| false);
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/root/Scripts/InstalledScriptInfos")))
            .returning(|_| false);

        // --- Execute & Verify ---
        let installed =
            InstalledPackages::new(&runtime, InstallLayout::under_root(Path::new("/root")));
        assert!(installed.find_all().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Foo", "1.0.0", &[]);
        write_module(&layout, "Foo", "2.0.0", &[]);
        write_module(&layout, "bar", "1.0.0", &[]);
        write_script(&layout, "Deploy", "0.1.0");

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout);

        let all = installed.list(&[]).unwrap();
        let ids: Vec<String> = all.iter().map(|r| r.identity().to_string()).collect();
        assert_eq!(ids, vec!["bar 1.0.0", "Deploy 0.1.0", "Foo 2.0.0", "Foo 1.0.0"]);

        let foo = installed.list(&["f*".to_string()]).unwrap();
        assert_eq!(foo.len(), 2);
        assert!(installed.list(&["Missing".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_installed_versions_case_insensitive() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Baz", "1.5.0", &[]);

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout);

        assert_eq!(
            installed.installed_versions("baz").unwrap(),
            vec!["1.5.0".parse::<PackageVersion>().unwrap()]
        );
        assert!(
            installed
                .is_installed(&PackageIdentity::new("BAZ", "1.5".parse().unwrap()))
                .unwrap()
        );
    }

    #[test]
    fn test_hidden_version_dirs_are_not_installed() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Foo", "1.0.0", &[]);
        std::fs::rename(
            layout.version_dir("Foo", &"1.0.0".parse().unwrap()),
            layout.package_dir("Foo").join(".1.0.0.incoming"),
        )
        .unwrap();

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout);

        assert!(installed.find_all().unwrap().is_empty());
        assert!(installed.installed_versions("Foo").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Foo", "1.0.0", &[]);
        let broken = layout.version_dir("Broken", &"1.0".parse().unwrap());
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(MODULE_RECORD_FILE), "nope").unwrap();

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout);
        let records = installed.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "Foo");
    }

    #[test]
    fn test_uninstall_removes_version_and_empty_package_dir() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Foo", "1.0.0", &[]);
        write_module(&layout, "Foo", "2.0.0", &[]);

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout.clone());

        let constraint: VersionConstraint = "1.0.0".parse().unwrap();
        let removed = installed.uninstall("foo", Some(&constraint), false).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!layout.version_dir("Foo", &"1.0".parse().unwrap()).exists());
        assert!(layout.version_dir("Foo", &"2.0".parse().unwrap()).exists());

        installed.uninstall("Foo", None, false).unwrap();
        assert!(!layout.package_dir("Foo").exists());
    }

    #[test]
    fn test_uninstall_script_removes_script_and_record() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_script(&layout, "Deploy", "1.0.0");

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout.clone());
        installed.uninstall("Deploy", None, false).unwrap();

        assert!(!layout.script_path("Deploy").exists());
        assert!(!layout.script_record_path("Deploy").exists());
    }

    #[test]
    fn test_uninstall_refuses_to_break_dependents() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Baz", "1.5.0", &[]);
        write_module(&layout, "Bar", "1.0.0", &[("Baz", "[1.0,2.0)")]);

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout.clone());

        let err = installed.uninstall("Baz", None, false).unwrap_err();
        match PackageError::of(&err) {
            Some(PackageError::DependentPackage { dependents, .. }) => {
                assert_eq!(dependents, &vec!["Bar".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(layout.version_dir("Baz", &"1.5".parse().unwrap()).exists());

        installed.uninstall("Baz", None, true).unwrap();
        assert!(!layout.package_dir("Baz").exists());
    }

    #[test]
    fn test_uninstall_allowed_when_other_version_still_satisfies() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::under_root(dir.path());
        write_module(&layout, "Baz", "1.5.0", &[]);
        write_module(&layout, "Baz", "1.8.0", &[]);
        write_module(&layout, "Bar", "1.0.0", &[("Baz", "[1.0,2.0)")]);

        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, layout);
        let constraint: VersionConstraint = "1.5.0".parse().unwrap();

        assert!(installed.uninstall("Baz", Some(&constraint), false).is_ok());
    }

    #[test]
    fn test_uninstall_unknown_package() {
        let dir = tempdir().unwrap();
        let runtime = RealRuntime;
        let installed = InstalledPackages::new(&runtime, InstallLayout::under_root(dir.path()));

        let err = installed.uninstall("Nope", None, false).unwrap_err();
        assert!(PackageError::is_not_found(&err));
    }
}
