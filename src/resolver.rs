//! Dependency resolution against a single source.
//!
//! The walk is an explicit pre-order worklist. Every selected
//! `(id, version)` pair is expanded at most once, so diamonds resolve once
//! and cycles terminate.

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashSet;
use std::fmt;

use crate::error::PackageError;
use crate::package::{
    Dependency, InstallRequest, InstalledQuery, PackageIdentity, PackageInfo, PackageVersion,
    VersionConstraint, VersionRange, select_best,
};
use crate::source::SourceClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Consider pre-release versions.
    pub prerelease: bool,
    /// Include dependencies even when a satisfying version is installed.
    pub reinstall: bool,
    /// Resolve the requested package only.
    pub skip_dependency_check: bool,
}

/// A package selected for installation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPackage {
    pub info: PackageInfo,
    /// The constraint it was selected under (`None` = latest).
    pub constraint: Option<VersionConstraint>,
    /// The package that required it; `None` for the requested package.
    pub parent: Option<PackageIdentity>,
}

impl ResolvedPackage {
    pub fn identity(&self) -> PackageIdentity {
        self.info.identity()
    }

    /// The constraint as text, for reporting.
    pub fn constraint_text(&self) -> String {
        self.constraint
            .as_ref()
            .map_or_else(|| "latest".to_string(), |c| c.to_string())
    }
}

impl fmt::Display for ResolvedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} (required by {})", self.identity(), parent),
            None => write!(f, "{}", self.identity()),
        }
    }
}

/// The requested package first, then its dependencies in pre-order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSet {
    pub packages: Vec<ResolvedPackage>,
}

impl ResolvedSet {
    pub fn root(&self) -> Option<&ResolvedPackage> {
        self.packages.first()
    }

    pub fn dependencies(&self) -> &[ResolvedPackage] {
        self.packages.get(1..).unwrap_or_default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.packages.iter().any(|p| p.info.id.eq_ignore_ascii_case(id))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

pub struct DependencyResolver<'a, S: SourceClient + ?Sized, Q: InstalledQuery + ?Sized> {
    source: &'a S,
    source_name: &'a str,
    installed: &'a Q,
}

impl<'a, S: SourceClient + ?Sized, Q: InstalledQuery + ?Sized> DependencyResolver<'a, S, Q> {
    pub fn new(source: &'a S, source_name: &'a str, installed: &'a Q) -> Self {
        Self {
            source,
            source_name,
            installed,
        }
    }

    /// Resolve `request` and its transitive dependencies at this source.
    ///
    /// Fails with `NotFound` when no version of the requested package
    /// satisfies its constraint, and with `DependencyNotFound` or
    /// `InvalidVersionRange` when a dependency cannot be resolved.
    #[tracing::instrument(skip(self), fields(source = self.source_name))]
    pub async fn resolve(
        &self,
        request: &InstallRequest,
        options: &ResolveOptions,
    ) -> Result<ResolvedSet> {
        let constraint = request.constraint.as_ref();
        let include_prerelease =
            options.prerelease || constraint.is_some_and(VersionConstraint::mentions_prerelease);

        let candidates = self
            .source
            .list_versions(&request.name, include_prerelease)
            .await
            .with_context(|| format!("Failed to query {} for {}", self.source_name, request.name))?;

        let root = select_best(&candidates, constraint, |p| &p.version)
            .cloned()
            .ok_or_else(|| PackageError::NotFound {
                name: request.to_string(),
                repository: self.source_name.to_string(),
            })?;
        debug!("Selected {} for {}", root.identity(), request);

        let mut packages = vec![ResolvedPackage {
            info: root,
            constraint: request.constraint.clone(),
            parent: None,
        }];
        if options.skip_dependency_check {
            return Ok(ResolvedSet { packages });
        }

        let root_identity = packages[0].identity();
        let mut visited: HashSet<(String, PackageVersion)> = HashSet::from([root_identity.key()]);
        let mut stack: Vec<(Dependency, PackageIdentity)> = packages[0]
            .info
            .dependencies
            .iter()
            .rev()
            .map(|d| (d.clone(), root_identity.clone()))
            .collect();

        while let Some((dependency, parent)) = stack.pop() {
            let Some(selected) = self
                .resolve_dependency(&dependency, &parent, &packages, options)
                .await?
            else {
                continue;
            };

            let identity = selected.identity();
            if !visited.insert(identity.key()) {
                continue;
            }

            stack.extend(
                selected
                    .info
                    .dependencies
                    .iter()
                    .rev()
                    .map(|d| (d.clone(), identity.clone())),
            );
            packages.push(selected);
        }

        Ok(ResolvedSet { packages })
    }

    /// Pick the version of one dependency, or `None` when it is already
    /// covered by this walk or by an installed version.
    async fn resolve_dependency(
        &self,
        dependency: &Dependency,
        parent: &PackageIdentity,
        selected: &[ResolvedPackage],
        options: &ResolveOptions,
    ) -> Result<Option<ResolvedPackage>> {
        let range = dependency
            .range
            .as_deref()
            .map(VersionRange::parse)
            .transpose()
            .with_context(|| format!("{} declares an invalid range for {}", parent, dependency.id))?;
        let constraint = range.map(VersionConstraint::Range);
        let satisfies = |version: &PackageVersion| {
            constraint.as_ref().is_none_or(|c| c.satisfies(version))
        };

        if selected
            .iter()
            .any(|p| p.info.id.eq_ignore_ascii_case(&dependency.id) && satisfies(&p.info.version))
        {
            debug!("{} already selected in this walk", dependency);
            return Ok(None);
        }

        if !options.reinstall {
            let installed = self
                .installed
                .installed_versions(&dependency.id)
                .with_context(|| format!("Failed to check installed versions of {}", dependency.id))?;
            if let Some(version) = installed.iter().find(|v| satisfies(v)) {
                debug!("{} satisfied by installed {}", dependency, version);
                return Ok(None);
            }
        }

        let include_prerelease = options.prerelease
            || constraint
                .as_ref()
                .is_some_and(VersionConstraint::mentions_prerelease);
        let not_found = || PackageError::DependencyNotFound {
            package: parent.to_string(),
            dependency: dependency.id.clone(),
            range: constraint
                .as_ref()
                .map_or_else(|| "any version".to_string(), |c| c.to_string()),
        };

        let candidates = self
            .source
            .list_versions(&dependency.id, include_prerelease)
            .await
            .with_context(not_found)?;
        let best = select_best(&candidates, constraint.as_ref(), |p| &p.version)
            .cloned()
            .ok_or_else(not_found)?;

        if selected
            .iter()
            .any(|p| p.info.id.eq_ignore_ascii_case(&best.id))
        {
            info!(
                "{} needs {} {}; installing it side by side with the version already selected",
                parent,
                best.id,
                best.version
            );
        }

        Ok(Some(ResolvedPackage {
            info: best,
            constraint,
            parent: Some(parent.clone()),
        }))
    }
}
