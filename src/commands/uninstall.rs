use anyhow::Result;
use log::debug;

use crate::{
    error::PackageError,
    package::{InstallScope, InstalledPackages, VersionConstraint},
    runtime::Runtime,
};

use super::config::Config;

/// Remove installed versions of the named packages (all versions unless
/// `version` narrows it down).
#[tracing::instrument(skip(config))]
pub fn uninstall<R: Runtime>(
    config: &Config<R>,
    names: &[String],
    version: Option<&str>,
    scope: InstallScope,
    skip_dependency_check: bool,
) -> Result<()> {
    let constraint = VersionConstraint::parse_optional(version.unwrap_or_default())?;
    if constraint.is_some() && names.len() > 1 {
        return Err(PackageError::InvalidArgument(
            "a version can only be given together with a single package name".into(),
        )
        .into());
    }

    let layout = config.layout(scope)?;
    debug!("Uninstalling from {:?}", layout.modules_dir());
    let installed = InstalledPackages::new(&config.runtime, layout);

    for name in names {
        installed.uninstall(name, constraint.as_ref(), skip_dependency_check)?;
    }
    Ok(())
}
