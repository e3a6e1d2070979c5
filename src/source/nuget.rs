//! NuGet v3 registration feed.
//!
//! `GET {base}/{id-lowercase}/index.json` returns pages of catalog entries.
//! Large packages ship pages without inline items; those are fetched from
//! the page's `@id`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::archive;
use crate::http::HttpClient;
use crate::package::{Dependency, PackageInfo, PackageVersion};
use crate::runtime::Runtime;

use super::SourceClient;

#[derive(Debug, Deserialize)]
struct RegistrationIndex {
    #[serde(default)]
    items: Vec<RegistrationPage>,
}

#[derive(Debug, Deserialize)]
struct RegistrationPage {
    #[serde(rename = "@id")]
    id: String,
    items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationLeaf {
    catalog_entry: CatalogEntry,
    package_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    id: String,
    version: String,
    description: Option<String>,
    authors: Option<StringOrList>,
    tags: Option<StringOrList>,
    /// Missing means listed
    listed: Option<bool>,
    #[serde(default)]
    require_license_acceptance: bool,
    project_url: Option<String>,
    license_url: Option<String>,
    #[serde(default)]
    dependency_groups: Vec<DependencyGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => s.split_whitespace().map(String::from).collect(),
            StringOrList::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DependencyGroup {
    #[serde(default)]
    dependencies: Vec<RegistrationDependency>,
}

#[derive(Debug, Deserialize)]
struct RegistrationDependency {
    id: String,
    range: Option<String>,
}

impl RegistrationLeaf {
    fn into_package(self) -> Option<PackageInfo> {
        let entry = self.catalog_entry;
        if entry.listed == Some(false) {
            debug!("Skipping unlisted {} {}", entry.id, entry.version);
            return None;
        }

        let version: PackageVersion = match entry.version.parse() {
            Ok(v) => v,
            Err(e) => {
                debug!("Skipping {} {}: {}", entry.id, entry.version, e);
                return None;
            }
        };

        let mut dependencies: Vec<Dependency> = Vec::new();
        for dep in entry
            .dependency_groups
            .into_iter()
            .flat_map(|g| g.dependencies)
        {
            if !dependencies.iter().any(|d| d.id.eq_ignore_ascii_case(&dep.id)) {
                let range = dep.range.filter(|r| !r.trim().is_empty());
                dependencies.push(Dependency::new(dep.id, range.as_deref()));
            }
        }

        Some(PackageInfo {
            id: entry.id,
            version,
            description: entry.description,
            authors: entry.authors.map(|a| a.into_vec().join(", ")),
            tags: entry.tags.map(StringOrList::into_vec).unwrap_or_default(),
            dependencies,
            require_license_acceptance: entry.require_license_acceptance,
            project_url: entry.project_url,
            license_url: entry.license_url,
            content_location: self.package_content,
        })
    }
}

pub struct NuGetFeed<'a, R: Runtime> {
    runtime: &'a R,
    http: HttpClient,
    base_url: String,
}

impl<'a, R: Runtime> NuGetFeed<'a, R> {
    pub fn new(runtime: &'a R, http: HttpClient, base_url: &str) -> Self {
        Self {
            runtime,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn index_url(&self, id: &str) -> String {
        format!("{}/{}/index.json", self.base_url, id.to_ascii_lowercase())
    }
}

#[async_trait]
impl<R: Runtime> SourceClient for NuGetFeed<'_, R> {
    #[tracing::instrument(skip(self))]
    async fn list_versions(&self, id: &str, include_prerelease: bool) -> Result<Vec<PackageInfo>> {
        let url = self.index_url(id);
        let Some(index) = self.http.get_json_optional::<RegistrationIndex>(&url).await? else {
            return Ok(Vec::new());
        };

        let mut leaves = Vec::new();
        for page in index.items {
            match page.items {
                Some(items) => leaves.extend(items),
                None => {
                    debug!("Fetching registration page {}", page.id);
                    let page: RegistrationPage = self
                        .http
                        .get_json(&page.id)
                        .await
                        .with_context(|| format!("Failed to fetch registration page for {}", id))?;
                    leaves.extend(page.items.unwrap_or_default());
                }
            }
        }

        Ok(leaves
            .into_iter()
            .filter_map(RegistrationLeaf::into_package)
            .filter(|p| p.id.eq_ignore_ascii_case(id))
            .filter(|p| include_prerelease || !p.version.is_prerelease())
            .collect())
    }

    #[tracing::instrument(skip(self, package), fields(package = %package.identity()))]
    async fn download(&self, package: &PackageInfo, destination: &Path) -> Result<()> {
        self.runtime.create_dir_all(destination)?;
        let archive_path = destination.join(format!(
            "{}.{}.nupkg",
            package.id.to_ascii_lowercase(),
            package.version
        ));

        self.http
            .download_file(&package.content_location, || {
                self.runtime.create_file(&archive_path)
            })
            .await
            .with_context(|| format!("Failed to download {}", package.identity()))?;

        archive::extract(self.runtime, &archive_path, destination)?;
        self.runtime.remove_file(&archive_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::TestPackage;
    use std::fs;
    use tempfile::tempdir;

    fn leaf(server_url: &str, id: &str, version: &str, extra: &str) -> String {
        format!(
            r#"{{
                "catalogEntry": {{
                    "id": "{id}",
                    "version": "{version}",
                    "description": "{id} package",
                    "authors": "Someone",
                    "tags": ["PSModule", "PSCommand_Get-{id}"],
                    "dependencyGroups": [{{ "dependencies": [{{ "id": "Baz", "range": "[1.0.0, 2.0.0)" }}] }}]
                    {extra}
                }},
                "packageContent": "{server_url}/content/{id}.{version}.nupkg"
            }}"#
        )
    }

    fn feed<'a>(runtime: &'a RealRuntime, url: &str) -> NuGetFeed<'a, RealRuntime> {
        NuGetFeed::new(runtime, HttpClient::new(reqwest::Client::new()), url)
    }

    #[tokio::test]
    async fn test_list_versions_inline_items() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();
        let body = format!(
            r#"{{ "count": 1, "items": [{{ "@id": "{url}/bar/page/1", "items": [{}, {}, {}] }}] }}"#,
            leaf(&url, "Bar", "1.0.0", ""),
            leaf(&url, "Bar", "1.1.0", r#", "listed": false"#),
            leaf(&url, "Bar", "2.0.0-beta", "")
        );
        let mock = server
            .mock("GET", "/bar/index.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(2)
            .create_async()
            .await;

        let runtime = RealRuntime;
        let feed = feed(&runtime, &format!("{}/", url));

        let stable = feed.list_versions("Bar", false).await.unwrap();
        assert_eq!(stable.len(), 1);
        let bar = &stable[0];
        assert_eq!(bar.version.to_string(), "1.0.0");
        assert_eq!(bar.tags, vec!["PSModule", "PSCommand_Get-Bar"]);
        assert_eq!(
            bar.dependencies,
            vec![Dependency::new("Baz", Some("[1.0.0, 2.0.0)"))]
        );
        assert_eq!(bar.content_location, format!("{}/content/Bar.1.0.0.nupkg", url));

        let all = feed.list_versions("Bar", true).await.unwrap();
        assert_eq!(all.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_versions_follows_page_links() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();
        let index = server
            .mock("GET", "/foo/index.json")
            .with_status(200)
            .with_body(format!(
                r#"{{ "items": [{{ "@id": "{url}/foo/page/0.1.0/2.0.0.json", "lower": "0.1.0", "upper": "2.0.0" }}] }}"#
            ))
            .create_async()
            .await;
        let page = server
            .mock("GET", "/foo/page/0.1.0/2.0.0.json")
            .with_status(200)
            .with_body(format!(
                r#"{{ "@id": "{url}/foo/page/0.1.0/2.0.0.json", "items": [{}, {}] }}"#,
                leaf(&url, "Foo", "0.1.0", ""),
                leaf(&url, "Foo", "2.0.0", "")
            ))
            .create_async()
            .await;

        let runtime = RealRuntime;
        let versions = feed(&runtime, &url).list_versions("Foo", false).await.unwrap();

        index.assert_async().await;
        page.assert_async().await;
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_package_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/nope/index.json")
            .with_status(404)
            .create_async()
            .await;

        let runtime = RealRuntime;
        let versions = feed(&runtime, &server.url())
            .list_versions("Nope", true)
            .await
            .unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn test_tags_as_string() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();
        let _mock = server
            .mock("GET", "/qux/index.json")
            .with_status(200)
            .with_body(format!(
                r#"{{ "items": [{{ "@id": "p", "items": [{{
                    "catalogEntry": {{ "id": "Qux", "version": "1.0.0", "tags": "PSModule PSFunction_Get-Qux", "requireLicenseAcceptance": true }},
                    "packageContent": "{url}/qux.nupkg"
                }}] }}] }}"#
            ))
            .create_async()
            .await;

        let runtime = RealRuntime;
        let versions = feed(&runtime, &url).list_versions("qux", false).await.unwrap();
        assert_eq!(versions[0].tags, vec!["PSModule", "PSFunction_Get-Qux"]);
        assert!(versions[0].require_license_acceptance);
        assert!(versions[0].dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_download_extracts_and_removes_archive() {
        let dir = tempdir().unwrap();
        let nupkg = TestPackage::new("Foo", "1.0.0")
            .file("Foo.psm1", "function Get-Foo {}")
            .write_to(&dir.path().join("build"));
        let bytes = fs::read(&nupkg).unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/content/foo.1.0.0.nupkg")
            .with_status(200)
            .with_body(bytes)
            .create_async()
            .await;

        let package = PackageInfo {
            id: "Foo".into(),
            version: "1.0.0".parse().unwrap(),
            content_location: format!("{}/content/foo.1.0.0.nupkg", server.url()),
            ..Default::default()
        };
        let staging = dir.path().join("staging");

        let runtime = RealRuntime;
        feed(&runtime, &server.url())
            .download(&package, &staging)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(staging.join("Foo.psm1").exists());
        assert!(!staging.join("foo.1.0.0.nupkg").exists());
    }
}
