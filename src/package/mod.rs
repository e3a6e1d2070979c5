//! Package model and the local install tree.
//!
//! Versions and ranges, package identities and manifests, the capability
//! index, the sidecar records written next to installed content, and the
//! queries over what is installed.

mod capability;
mod identity;
mod installed;
mod layout;
mod meta;
mod version;

pub use capability::CapabilityIndex;
pub use identity::{Dependency, InstallRequest, PackageIdentity, PackageInfo};
#[cfg(test)]
pub use installed::MockInstalledQuery;
pub use installed::{InstalledPackages, InstalledQuery};
pub use layout::{
    InstallLayout, InstallScope, MODULE_RECORD_FILE, scope_dir, scope_root, script_file_name,
};
pub use meta::{InstalledPackageRecord, PackageType};
pub use version::{Bound, PackageVersion, VersionConstraint, VersionRange, select_best};

/// True when `name` matches one of `patterns` (glob wildcards, ignoring
/// case). An empty pattern list or `*` matches everything.
pub fn matches_any(patterns: &[String], name: &str) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    patterns.is_empty()
        || patterns.iter().any(|pattern| match glob::Pattern::new(pattern) {
            Ok(glob) => glob.matches_with(name, options),
            Err(_) => pattern.eq_ignore_ascii_case(name),
        })
}
