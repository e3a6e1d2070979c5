use anyhow::Result;
use log::debug;

use crate::{
    package::{InstallScope, InstalledPackageRecord, InstalledPackages},
    runtime::Runtime,
};

use super::config::Config;

/// List installed packages, optionally filtered by name patterns
#[tracing::instrument(skip(config))]
pub fn list<R: Runtime>(config: &Config<R>, names: &[String], scope: InstallScope) -> Result<()> {
    let layout = config.read_layout(scope)?;
    debug!("Listing packages from {:?}", layout.modules_dir());

    let records = InstalledPackages::new(&config.runtime, layout).list(names)?;
    if records.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    debug!("Found {} package(s)", records.len());
    for record in &records {
        println!("{}", line(record));
    }
    Ok(())
}

fn line(record: &InstalledPackageRecord) -> String {
    format!(
        "{} {} ({}, from {})",
        record.id, record.version, record.package_type, record.source_name
    )
}
