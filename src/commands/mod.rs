use anyhow::Result;
use log::debug;

use crate::{
    cleanup::{self, SharedCleanupContext},
    error::PackageError,
    package::{InstallRequest, VersionConstraint},
};

pub mod config;
mod find;
mod install;
mod list;
mod repo;
mod uninstall;

pub use find::find;
pub use install::{install, save};
pub use list::list;
pub use repo::{repo_add, repo_list, repo_remove, repo_set};
pub use uninstall::uninstall;

/// One request per name, all sharing `version`.
///
/// A version only makes sense for a single, literal name.
pub(crate) fn build_requests(names: &[String], version: Option<&str>) -> Result<Vec<InstallRequest>> {
    let names: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return Err(PackageError::InvalidArgument("no package name given".into()).into());
    }
    if let Some(name) = names.iter().find(|n| n.contains(['*', '?', '['])) {
        return Err(PackageError::InvalidArgument(format!(
            "wildcards are not allowed in package names here: '{}'",
            name
        ))
        .into());
    }

    let constraint = VersionConstraint::parse_optional(version.unwrap_or_default())?;
    if constraint.is_some() && names.len() > 1 {
        return Err(PackageError::InvalidArgument(
            "a version can only be given together with a single package name".into(),
        )
        .into());
    }

    Ok(names
        .into_iter()
        .map(|name| InstallRequest::new(name, constraint.clone()))
        .collect())
}

/// Remove registered staging directories and exit with 130 on Ctrl-C.
/// Abort the returned handle once the work is done.
pub(crate) fn spawn_interrupt_handler(ctx: SharedCleanupContext) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up...");
            debug!("Removing {} staging path(s)", cleanup::lock(&ctx).paths().len());
            cleanup::lock(&ctx).cleanup();
            std::process::exit(130); // Standard exit code for Ctrl-C
        }
    })
}
