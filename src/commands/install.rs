use anyhow::{Result, bail};
use log::debug;
use std::path::Path;

use crate::{
    cleanup,
    error::PackageError,
    orchestrator::{Orchestrator, RunSummary, select_repositories},
    package::{InstallLayout, InstallScope},
    runtime::Runtime,
    transaction::InstallOptions,
};

use super::{build_requests, config::Config, spawn_interrupt_handler};

/// Install packages from the registered repositories.
#[tracing::instrument(skip(config))]
pub async fn install<R: Runtime>(
    config: &Config<R>,
    names: &[String],
    version: Option<&str>,
    repositories: &[String],
    scope: InstallScope,
    options: InstallOptions,
) -> Result<()> {
    let requests = build_requests(names, version)?;
    let repositories = select_repositories(config.registry().list(&[])?, repositories)?;
    let layout = config.layout(scope)?;
    debug!("Installing into {:?}", layout.modules_dir());

    let factory = config.factory();
    let cleanup = cleanup::new_shared();
    let ctrl_c_handler = spawn_interrupt_handler(cleanup.clone());

    let orchestrator = Orchestrator::new(&config.runtime, &factory, layout, cleanup);
    let result = orchestrator.run(&requests, &repositories, &options).await;

    ctrl_c_handler.abort();
    report(&result?)
}

/// Download packages and their dependencies into `path` without
/// installing them.
#[tracing::instrument(skip(config))]
pub async fn save<R: Runtime>(
    config: &Config<R>,
    names: &[String],
    version: Option<&str>,
    repositories: &[String],
    path: &Path,
    options: InstallOptions,
) -> Result<()> {
    if !config.runtime.is_dir(path) {
        return Err(PackageError::InvalidArgument(format!(
            "save path {:?} is not an existing directory",
            path
        ))
        .into());
    }

    let requests = build_requests(names, version)?;
    let repositories = select_repositories(config.registry().list(&[])?, repositories)?;

    let factory = config.factory();
    let cleanup = cleanup::new_shared();
    let ctrl_c_handler = spawn_interrupt_handler(cleanup.clone());

    let orchestrator =
        Orchestrator::new(&config.runtime, &factory, InstallLayout::flat(path), cleanup);
    let result = orchestrator.save(&requests, &repositories, &options).await;

    ctrl_c_handler.abort();
    report(&result?)
}

fn report(summary: &RunSummary) -> Result<()> {
    debug!(
        "{} installed, {} already present, {} failure(s)",
        summary.installed.len(),
        summary.already_installed.len(),
        summary.failures.len()
    );

    if !summary.is_complete() {
        let names: Vec<String> = summary.unsatisfied.iter().map(|r| r.to_string()).collect();
        bail!(
            "No registered repository could provide: {}. Use 'modget find' to check availability.",
            names.join(", ")
        );
    }
    if summary.installed.is_empty() {
        println!("Nothing to do, everything requested is already installed.");
    }
    Ok(())
}
