//! Install tree layout.
//!
//! ```text
//! <root>/Modules/<Id>/<Version>/...            module content + PackageInfo.json
//! <root>/Scripts/<Id>.ps1                      script content
//! <root>/Scripts/InstalledScriptInfos/<Id>_InstalledScriptInfo.json
//! ```

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PackageError;
use crate::runtime::Runtime;

use super::version::PackageVersion;

/// Sidecar file inside a module version directory.
pub const MODULE_RECORD_FILE: &str = "PackageInfo.json";
const SCRIPT_INFO_DIR: &str = "InstalledScriptInfos";
const SCRIPT_EXTENSION: &str = "ps1";
pub(crate) const SCRIPT_RECORD_SUFFIX: &str = "_InstalledScriptInfo.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallScope {
    #[default]
    CurrentUser,
    AllUsers,
}

impl FromStr for InstallScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("currentuser") {
            Ok(InstallScope::CurrentUser)
        } else if s.eq_ignore_ascii_case("allusers") {
            Ok(InstallScope::AllUsers)
        } else {
            Err(PackageError::InvalidArgument(format!(
                "unknown scope '{}' (expected CurrentUser or AllUsers)",
                s
            ))
            .into())
        }
    }
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallScope::CurrentUser => write!(f, "CurrentUser"),
            InstallScope::AllUsers => write!(f, "AllUsers"),
        }
    }
}

/// Resolve the install root for `scope`, for writing.
///
/// `root_override` replaces the scope root entirely and skips the privilege check.
#[tracing::instrument(skip(runtime))]
pub fn scope_root<R: Runtime>(
    runtime: &R,
    scope: InstallScope,
    root_override: Option<&Path>,
) -> Result<PathBuf> {
    if root_override.is_none() && scope == InstallScope::AllUsers && !runtime.is_privileged() {
        return Err(PackageError::PrivilegeRequired("install for all users".into()).into());
    }
    scope_dir(runtime, scope, root_override)
}

/// The install root for `scope` without the privilege check, for reading.
pub fn scope_dir<R: Runtime>(
    runtime: &R,
    scope: InstallScope,
    root_override: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(root) = root_override {
        return Ok(root.to_path_buf());
    }

    match scope {
        InstallScope::CurrentUser => {
            let data_dir = runtime
                .data_dir()
                .context("Could not determine the user data directory")?;
            Ok(data_dir.join("modget"))
        }
        InstallScope::AllUsers => {
            let shared = runtime
                .shared_data_dir()
                .context("Could not determine the machine-wide data directory")?;
            Ok(shared.join("modget"))
        }
    }
}

/// Where modules and scripts land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    modules_dir: PathBuf,
    scripts_dir: PathBuf,
}

impl InstallLayout {
    /// The regular install tree under a scope root.
    pub fn under_root(root: &Path) -> Self {
        Self {
            modules_dir: root.join("Modules"),
            scripts_dir: root.join("Scripts"),
        }
    }

    /// A flat layout for saving packages into an arbitrary directory.
    pub fn flat(path: &Path) -> Self {
        Self {
            modules_dir: path.to_path_buf(),
            scripts_dir: path.to_path_buf(),
        }
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Returns: `<modules>/<id>`
    pub fn package_dir(&self, id: &str) -> PathBuf {
        self.modules_dir.join(id)
    }

    /// Returns: `<modules>/<id>/<numeric version>`
    pub fn version_dir(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.package_dir(id).join(version.numeric())
    }

    pub fn module_record_path(&self, id: &str, version: &PackageVersion) -> PathBuf {
        self.version_dir(id, version).join(MODULE_RECORD_FILE)
    }

    pub fn script_info_dir(&self) -> PathBuf {
        self.scripts_dir.join(SCRIPT_INFO_DIR)
    }

    /// Returns: `<scripts>/<id>.ps1`
    pub fn script_path(&self, id: &str) -> PathBuf {
        self.scripts_dir.join(script_file_name(id))
    }

    /// Returns: `<scripts>/InstalledScriptInfos/<id>_InstalledScriptInfo.json`
    pub fn script_record_path(&self, id: &str) -> PathBuf {
        self.script_info_dir()
            .join(format!("{}{}", id, SCRIPT_RECORD_SUFFIX))
    }
}

/// `<id>.ps1`
pub fn script_file_name(id: &str) -> String {
    format!("{}.{}", id, SCRIPT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    #[test]
    fn test_scope_parse_is_case_insensitive() {
        assert_eq!(
            "currentuser".parse::<InstallScope>().unwrap(),
            InstallScope::CurrentUser
        );
        assert_eq!(
            "AllUsers".parse::<InstallScope>().unwrap(),
            InstallScope::AllUsers
        );
        assert!("Machine".parse::<InstallScope>().is_err());
    }

    #[test]
    fn test_current_user_root_uses_data_dir() {
        let mut runtime = MockRuntime::new();

        // --- Setup ---
        runtime
            .expect_data_dir()
            .returning(|| Some(PathBuf::from("/home/user/.local/share")));

        // --- Execute & Verify ---
        let root = scope_root(&runtime, InstallScope::CurrentUser, None).unwrap();
        assert_eq!(root, PathBuf::from("/home/user/.local/share/modget"));
    }

    #[test]
    fn test_all_users_requires_privilege() {
        let mut runtime = MockRuntime::new();

        // --- Setup ---
        runtime.expect_is_privileged().returning(|| false);

        // --- Execute & Verify ---
        let err = scope_root(&runtime, InstallScope::AllUsers, None).unwrap_err();
        assert!(matches!(
            PackageError::of(&err),
            Some(PackageError::PrivilegeRequired(_))
        ));
    }

    #[test]
    fn test_all_users_root_when_privileged() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| true);
        runtime
            .expect_shared_data_dir()
            .returning(|| Some(PathBuf::from("/usr/local/share")));

        let root = scope_root(&runtime, InstallScope::AllUsers, None).unwrap();
        assert_eq!(root, PathBuf::from("/usr/local/share/modget"));
    }

    #[test]
    fn test_reading_all_users_needs_no_privilege() {
        // No is_privileged expectation: reading must not ask
        let mut runtime = MockRuntime::new();
        runtime
            .expect_shared_data_dir()
            .returning(|| Some(PathBuf::from("/usr/local/share")));
        let root = scope_dir(&runtime, InstallScope::AllUsers, None).unwrap();
        assert_eq!(root, PathBuf::from("/usr/local/share/modget"));
    }

    #[test]
    fn test_override_skips_scope_lookup() {
        // No expectations: the override must not touch the runtime
        let runtime = MockRuntime::new();
        let root = scope_root(
            &runtime,
            InstallScope::AllUsers,
            Some(Path::new("/opt/custom")),
        )
        .unwrap();
        assert_eq!(root, PathBuf::from("/opt/custom"));
    }

    #[test]
    fn test_layout_paths() {
        let layout = InstallLayout::under_root(Path::new("/root"));
        let version: PackageVersion = "2.1.0-rc1".parse().unwrap();

        assert_eq!(
            layout.version_dir("Foo", &version),
            PathBuf::from("/root/Modules/Foo/2.1.0")
        );
        assert_eq!(
            layout.module_record_path("Foo", &version),
            PathBuf::from("/root/Modules/Foo/2.1.0/PackageInfo.json")
        );
        assert_eq!(
            layout.script_path("Deploy"),
            PathBuf::from("/root/Scripts/Deploy.ps1")
        );
        assert_eq!(
            layout.script_record_path("Deploy"),
            PathBuf::from("/root/Scripts/InstalledScriptInfos/Deploy_InstalledScriptInfo.json")
        );
    }

    #[test]
    fn test_flat_layout_for_save() {
        let layout = InstallLayout::flat(Path::new("/tmp/out"));
        let version: PackageVersion = "1.0".parse().unwrap();

        assert_eq!(
            layout.version_dir("Foo", &version),
            PathBuf::from("/tmp/out/Foo/1.0.0")
        );
        assert_eq!(
            layout.script_path("Deploy"),
            PathBuf::from("/tmp/out/Deploy.ps1")
        );
    }
}
