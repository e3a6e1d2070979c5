//! Environment variables, well-known directories and privilege checks.

use std::env;
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    pub(crate) fn config_dir_impl(&self) -> Option<PathBuf> {
        dirs::config_dir()
    }

    /// Per-user data directory (`~/.local/share`, `%APPDATA%`, ...).
    pub(crate) fn data_dir_impl(&self) -> Option<PathBuf> {
        dirs::data_dir()
    }

    /// `/usr/local/share` on Unix, `%ProgramFiles%` on Windows.
    #[tracing::instrument(skip(self))]
    pub(crate) fn shared_data_dir_impl(&self) -> Option<PathBuf> {
        if cfg!(windows) {
            env::var_os("ProgramFiles").map(PathBuf::from)
        } else {
            Some(PathBuf::from("/usr/local/share"))
        }
    }

    pub(crate) fn temp_dir_impl(&self) -> PathBuf {
        env::temp_dir()
    }

    /// Root on Unix, an elevated token on Windows.
    #[tracing::instrument(skip(self))]
    pub(crate) fn is_privileged_impl(&self) -> bool {
        #[cfg(unix)]
        return nix::unistd::geteuid().is_root();

        #[cfg(windows)]
        return is_elevated::is_elevated();
    }
}
