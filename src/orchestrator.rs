//! Runs requests against the registered repositories in priority order.
//!
//! Each source gets the requests still outstanding after the previous ones.
//! The resolver and the transaction report what they did as values, and the
//! orchestrator folds those into the next outstanding set.

use anyhow::Result;
use log::{debug, info, warn};

use crate::cleanup::SharedCleanupContext;
use crate::error::PackageError;
use crate::package::{InstallLayout, InstallRequest, InstalledPackages, PackageIdentity};
use crate::repository::{self, RepositoryEntry};
use crate::resolver::{DependencyResolver, ResolveOptions, ResolvedSet};
use crate::runtime::Runtime;
use crate::source::{SourceClient, SourceFactory};
use crate::transaction::{InstallOptions, InstallTransaction, PackageFailure, TransactionOutcome};

/// The result of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub installed: Vec<PackageIdentity>,
    pub already_installed: Vec<PackageIdentity>,
    pub failures: Vec<PackageFailure>,
    /// Requests no repository could satisfy.
    pub unsatisfied: Vec<InstallRequest>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.unsatisfied.is_empty()
    }
}

/// Restrict `repositories` to the ones named (glob patterns allowed), keeping
/// their order. An empty `names` keeps every repository.
pub fn select_repositories(
    repositories: Vec<RepositoryEntry>,
    names: &[String],
) -> Result<Vec<RepositoryEntry>> {
    for name in names {
        if repository::select(&repositories, std::slice::from_ref(name))
            .next()
            .is_none()
        {
            return Err(PackageError::UnknownRepository(name.clone()).into());
        }
    }

    Ok(repository::select(&repositories, names).cloned().collect())
}

pub struct Orchestrator<'a, R: Runtime, F: SourceFactory + ?Sized> {
    runtime: &'a R,
    factory: &'a F,
    layout: InstallLayout,
    cleanup: SharedCleanupContext,
}

impl<'a, R: Runtime, F: SourceFactory + ?Sized> Orchestrator<'a, R, F> {
    pub fn new(
        runtime: &'a R,
        factory: &'a F,
        layout: InstallLayout,
        cleanup: SharedCleanupContext,
    ) -> Self {
        Self {
            runtime,
            factory,
            layout,
            cleanup,
        }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Install `requests` from `repositories`, which must already be in
    /// priority order.
    #[tracing::instrument(skip(self, repositories))]
    pub async fn run(
        &self,
        requests: &[InstallRequest],
        repositories: &[RepositoryEntry],
        options: &InstallOptions,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut outstanding: Vec<InstallRequest> = Vec::new();
        merge_requests(&mut outstanding, requests.iter().cloned());

        for entry in repositories {
            if outstanding.is_empty() {
                break;
            }

            if !self.approve(entry, options)? {
                let denied = PackageError::TrustDenied(entry.name.clone());
                warn!("{}", denied);
                println!("    skipped {}", entry);
                continue;
            }

            let source = match self.factory.create(entry) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Skipping repository {}: {:#}", entry, e);
                    continue;
                }
            };

            let delta = self
                .run_source(entry, source.as_ref(), &outstanding, options)
                .await;

            summary.installed.extend(delta.committed);
            summary.already_installed.extend(delta.already_installed);
            summary.failures.extend(delta.failures);
            outstanding.clear();
            merge_requests(&mut outstanding, delta.unsatisfied);
        }

        summary.unsatisfied = outstanding;
        Ok(summary)
    }

    /// Same as [`run`](Self::run), into this orchestrator's layout as a plain
    /// copy: no license prompt, nothing considered installed already.
    pub async fn save(
        &self,
        requests: &[InstallRequest],
        repositories: &[RepositoryEntry],
        options: &InstallOptions,
    ) -> Result<RunSummary> {
        let options = InstallOptions {
            save_mode: true,
            ..*options
        };
        self.run(requests, repositories, &options).await
    }

    /// Resolve `request` without installing. The first repository that
    /// resolves it wins.
    #[tracing::instrument(skip(self, repositories))]
    pub async fn find(
        &self,
        request: &InstallRequest,
        repositories: &[RepositoryEntry],
        options: &ResolveOptions,
    ) -> Result<Option<(RepositoryEntry, ResolvedSet)>> {
        let installed = InstalledPackages::new(self.runtime, self.layout.clone());
        // Report the whole set, installed or not
        let options = ResolveOptions {
            reinstall: true,
            ..*options
        };

        for entry in repositories {
            let source = match self.factory.create(entry) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Skipping repository {}: {:#}", entry, e);
                    continue;
                }
            };

            let resolver = DependencyResolver::new(source.as_ref(), &entry.name, &installed);
            match resolver.resolve(request, &options).await {
                Ok(set) => return Ok(Some((entry.clone(), set))),
                Err(e) if PackageError::is_not_found(&e) => {
                    debug!("{} not found in {}: {:#}", request, entry.name, e)
                }
                Err(e) => warn!("Failed to query {}: {:#}", entry, e),
            }
        }
        Ok(None)
    }

    fn approve(&self, entry: &RepositoryEntry, options: &InstallOptions) -> Result<bool> {
        if entry.trusted || options.trust_repository || options.force {
            return Ok(true);
        }
        self.runtime.confirm(&format!(
            "Repository {} is not trusted. Install packages from it anyway? [y/N] ",
            entry
        ))
    }

    /// Resolve and install each outstanding request at one source.
    async fn run_source(
        &self,
        entry: &RepositoryEntry,
        source: &(dyn SourceClient + '_),
        outstanding: &[InstallRequest],
        options: &InstallOptions,
    ) -> TransactionOutcome {
        let installed = InstalledPackages::new(self.runtime, self.layout.clone());
        let resolver = DependencyResolver::new(source, &entry.name, &installed);
        let transaction = InstallTransaction::new(
            self.runtime,
            source,
            entry,
            &self.layout,
            &installed,
            self.cleanup.clone(),
        );
        let resolve_options = options.resolve_options();

        let mut delta = TransactionOutcome::default();
        for request in outstanding {
            println!("  resolving {} in {}", request, entry.name);
            let resolved = match resolver.resolve(request, &resolve_options).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    if PackageError::is_not_found(&e) {
                        info!("{:#}", e);
                    } else {
                        warn!("Failed to resolve {} in {}: {:#}", request, entry.name, e);
                    }
                    delta.unsatisfied.push(request.clone());
                    continue;
                }
            };

            let outcome = transaction.install(&resolved, options).await;
            delta.committed.extend(outcome.committed);
            delta.already_installed.extend(outcome.already_installed);
            delta.failures.extend(outcome.failures);
            delta.unsatisfied.extend(outcome.unsatisfied);
        }
        delta
    }
}

/// Append `requests` to `into`, skipping duplicates.
fn merge_requests(into: &mut Vec<InstallRequest>, requests: impl IntoIterator<Item = InstallRequest>) {
    for request in requests {
        let duplicate = into.iter().any(|r| {
            r.name.eq_ignore_ascii_case(&request.name) && r.constraint == request.constraint
        });
        if !duplicate {
            into.push(request);
        }
    }
}
