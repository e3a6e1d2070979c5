use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::package::PackageInfo;
use crate::runtime::Runtime;

use super::{SourceClient, nuspec};

/// A directory of `.nupkg` files.
pub struct LocalFeed<'a, R: Runtime> {
    runtime: &'a R,
    dir: PathBuf,
}

impl<'a, R: Runtime> LocalFeed<'a, R> {
    pub fn new(runtime: &'a R, dir: PathBuf) -> Self {
        Self { runtime, dir }
    }

    fn read_package(&self, path: &Path) -> Result<PackageInfo> {
        let manifest = archive::read_manifest(self.runtime, path)?;
        let mut info = nuspec::parse(&manifest)
            .with_context(|| format!("Failed to read manifest of {:?}", path))?;
        info.content_location = path.to_string_lossy().to_string();
        Ok(info)
    }
}

#[async_trait]
impl<R: Runtime> SourceClient for LocalFeed<'_, R> {
    #[tracing::instrument(skip(self))]
    async fn list_versions(&self, id: &str, include_prerelease: bool) -> Result<Vec<PackageInfo>> {
        if !self.runtime.is_dir(&self.dir) {
            bail!("Repository directory {:?} does not exist", self.dir);
        }

        let mut versions = Vec::new();
        for path in self.runtime.read_dir(&self.dir)? {
            let is_package = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("nupkg"));
            if !is_package {
                continue;
            }

            // One broken archive must not hide the rest of the feed
            let info = match self.read_package(&path) {
                Ok(info) => info,
                Err(e) => {
                    warn!("Skipping {:?}: {:#}", path, e);
                    continue;
                }
            };

            if !info.id.eq_ignore_ascii_case(id) {
                continue;
            }
            if info.version.is_prerelease() && !include_prerelease {
                debug!("Skipping pre-release {}", info.identity());
                continue;
            }
            versions.push(info);
        }

        debug!("{} version(s) of {} in {:?}", versions.len(), id, self.dir);
        Ok(versions)
    }

    #[tracing::instrument(skip(self, package), fields(package = %package.identity()))]
    async fn download(&self, package: &PackageInfo, destination: &Path) -> Result<()> {
        archive::extract(
            self.runtime,
            Path::new(&package.content_location),
            destination,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::TestPackage;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_versions_matches_id_case_insensitively() {
        let dir = tempdir().unwrap();
        TestPackage::new("Foo", "1.0.0").write_to(dir.path());
        TestPackage::new("Foo", "2.0.0").write_to(dir.path());
        TestPackage::new("Other", "1.0.0").write_to(dir.path());
        fs::write(dir.path().join("readme.txt"), "not a package").unwrap();

        let runtime = RealRuntime;
        let feed = LocalFeed::new(&runtime, dir.path().to_path_buf());
        let mut versions: Vec<String> = feed
            .list_versions("FOO", false)
            .await
            .unwrap()
            .iter()
            .map(|p| p.version.to_string())
            .collect();
        versions.sort();

        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);
    }

    #[tokio::test]
    async fn test_list_versions_filters_prerelease() {
        let dir = tempdir().unwrap();
        TestPackage::new("Foo", "1.0.0").write_to(dir.path());
        TestPackage::new("Foo", "2.0.0-beta").write_to(dir.path());

        let runtime = RealRuntime;
        let feed = LocalFeed::new(&runtime, dir.path().to_path_buf());

        assert_eq!(feed.list_versions("Foo", false).await.unwrap().len(), 1);
        assert_eq!(feed.list_versions("Foo", true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_broken_archive_is_skipped() {
        let dir = tempdir().unwrap();
        TestPackage::new("Foo", "1.0.0").write_to(dir.path());
        fs::write(dir.path().join("Foo.9.9.9.nupkg"), "garbage").unwrap();

        let runtime = RealRuntime;
        let feed = LocalFeed::new(&runtime, dir.path().to_path_buf());

        let versions = feed.list_versions("Foo", false).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version.to_string(), "1.0.0");
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let runtime = RealRuntime;
        let feed = LocalFeed::new(&runtime, dir.path().join("nope"));

        assert!(feed.list_versions("Foo", false).await.is_err());
    }

    #[tokio::test]
    async fn test_download_extracts_archive() {
        let dir = tempdir().unwrap();
        let feed_dir = dir.path().join("feed");
        TestPackage::new("Foo", "1.0.0")
            .file("Foo.psm1", "function Get-Foo {}")
            .write_to(&feed_dir);

        let runtime = RealRuntime;
        let feed = LocalFeed::new(&runtime, feed_dir);
        let package = feed.list_versions("Foo", false).await.unwrap().remove(0);

        let staging = dir.path().join("staging");
        feed.download(&package, &staging).await.unwrap();

        assert_eq!(
            fs::read_to_string(staging.join("Foo.psm1")).unwrap(),
            "function Get-Foo {}"
        );
    }
}
