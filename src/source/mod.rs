//! Source clients: how package metadata and content are fetched from a
//! registered repository.
//!
//! Two feed kinds exist: a local directory of `.nupkg` files and a remote
//! NuGet v3 registration feed. The resolver and the transaction only see
//! [`SourceClient`].

mod local;
mod nuget;
pub mod nuspec;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::http::HttpClient;
use crate::package::PackageInfo;
use crate::repository::RepositoryEntry;
use crate::runtime::Runtime;

pub use local::LocalFeed;
pub use nuget::NuGetFeed;

/// Metadata queries and content download against one repository.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Every version of `id` the source offers. Pre-releases are left out
    /// unless `include_prerelease` is set. An unknown id yields an empty list.
    async fn list_versions(&self, id: &str, include_prerelease: bool) -> Result<Vec<PackageInfo>>;

    /// Materialize the package content into `destination`; the package root
    /// becomes the directory root.
    async fn download(&self, package: &PackageInfo, destination: &Path) -> Result<()>;
}

/// Builds the client for a registered repository.
pub trait SourceFactory {
    fn create<'s>(&'s self, entry: &RepositoryEntry) -> Result<Box<dyn SourceClient + 's>>;
}

/// `http(s)://` URLs get a [`NuGetFeed`]; anything else is a local directory.
pub struct FeedFactory<'a, R: Runtime> {
    runtime: &'a R,
    http: HttpClient,
}

impl<'a, R: Runtime> FeedFactory<'a, R> {
    pub fn new(runtime: &'a R, http: HttpClient) -> Self {
        Self { runtime, http }
    }
}

impl<R: Runtime> SourceFactory for FeedFactory<'_, R> {
    fn create<'s>(&'s self, entry: &RepositoryEntry) -> Result<Box<dyn SourceClient + 's>> {
        if entry.is_remote() {
            Ok(Box::new(NuGetFeed::new(
                self.runtime,
                self.http.clone(),
                &entry.url,
            )))
        } else {
            Ok(Box::new(LocalFeed::new(self.runtime, local_path(&entry.url))))
        }
    }
}

/// Directory of a local repository URL (`file:///srv/feed` or `/srv/feed`).
pub fn local_path(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("FILE://"))
        .unwrap_or(url);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::TestPackage;
    use tempfile::tempdir;

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("file:///srv/feed"), PathBuf::from("/srv/feed"));
        assert_eq!(local_path("/srv/feed"), PathBuf::from("/srv/feed"));
        assert_eq!(local_path("feeds/local"), PathBuf::from("feeds/local"));
    }

    #[tokio::test]
    async fn test_factory_builds_local_feed_for_paths() {
        let dir = tempdir().unwrap();
        TestPackage::new("Foo", "1.0.0").write_to(dir.path());

        let runtime = RealRuntime;
        let factory = FeedFactory::new(&runtime, HttpClient::new(reqwest::Client::new()));
        let entry = RepositoryEntry {
            name: "Local".into(),
            url: format!("file://{}", dir.path().display()),
            priority: 0,
            trusted: true,
        };

        let client = factory.create(&entry).unwrap();
        let versions = client.list_versions("foo", false).await.unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_factory_builds_nuget_feed_for_urls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/foo/index.json")
            .with_status(404)
            .create_async()
            .await;

        let runtime = RealRuntime;
        let factory = FeedFactory::new(&runtime, HttpClient::new(reqwest::Client::new()));
        let entry = RepositoryEntry {
            name: "Remote".into(),
            url: server.url(),
            priority: 10,
            trusted: false,
        };

        let client = factory.create(&entry).unwrap();
        assert!(client.list_versions("Foo", false).await.unwrap().is_empty());
        mock.assert_async().await;
    }
}
