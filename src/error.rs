//! Domain error kinds.
//!
//! Operations return `anyhow::Result`; the variants below travel inside the
//! `anyhow::Error` and callers classify them with [`PackageError::of`].

use std::fmt;

/// Errors with a meaning the orchestrator or the CLI reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    /// Empty name, empty url, priority out of range, and similar caller mistakes.
    InvalidArgument(String),
    /// A repository with this name is already registered.
    DuplicateName(String),
    /// The named repository is not registered (update/remove).
    RepositoryNotFound(String),
    /// An explicitly requested repository does not exist (install/find).
    UnknownRepository(String),
    /// A version string could not be parsed.
    InvalidVersion(String),
    /// A version range could not be parsed.
    InvalidVersionRange { range: String, reason: String },
    /// No version of the package satisfies the request at this source.
    NotFound { name: String, repository: String },
    /// A dependency of the package cannot be satisfied at this source.
    DependencyNotFound {
        package: String,
        dependency: String,
        range: String,
    },
    /// The caller declined to use an untrusted source.
    TrustDenied(String),
    /// The package requires license acceptance but ships no license text.
    LicenseFileMissing(String),
    /// The caller declined the package license.
    LicenseDeclined(String),
    /// The package exposes capabilities already provided by installed packages.
    Clobber {
        package: String,
        conflicts: Vec<String>,
    },
    /// Removing the package would break installed packages that depend on it.
    DependentPackage {
        package: String,
        dependents: Vec<String>,
    },
    /// The operation needs elevated privileges.
    PrivilegeRequired(String),
}

impl PackageError {
    /// Find a `PackageError` anywhere in an error chain.
    pub fn of(error: &anyhow::Error) -> Option<&PackageError> {
        // Context values are only visible through anyhow's own downcast
        error
            .downcast_ref::<PackageError>()
            .or_else(|| error.chain().find_map(|e| e.downcast_ref::<PackageError>()))
    }

    /// True when the error only means "try the next source".
    pub fn is_not_found(error: &anyhow::Error) -> bool {
        matches!(
            Self::of(error),
            Some(PackageError::NotFound { .. } | PackageError::DependencyNotFound { .. })
        )
    }
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            PackageError::DuplicateName(name) => {
                write!(f, "Repository '{}' is already registered", name)
            }
            PackageError::RepositoryNotFound(name) => {
                write!(f, "Repository '{}' is not registered", name)
            }
            PackageError::UnknownRepository(name) => write!(
                f,
                "Unknown repository '{}'. Use 'modget repo list' to see registered repositories.",
                name
            ),
            PackageError::InvalidVersion(version) => {
                write!(f, "Invalid version '{}'", version)
            }
            PackageError::InvalidVersionRange { range, reason } => {
                write!(f, "Invalid version range '{}': {}", range, reason)
            }
            PackageError::NotFound { name, repository } => {
                write!(f, "Package '{}' was not found in repository '{}'", name, repository)
            }
            PackageError::DependencyNotFound {
                package,
                dependency,
                range,
            } => write!(
                f,
                "Dependency '{}' ({}) of package '{}' could not be resolved",
                dependency, range, package
            ),
            PackageError::TrustDenied(source) => {
                write!(f, "Repository '{}' is not trusted; skipped", source)
            }
            PackageError::LicenseFileMissing(package) => write!(
                f,
                "Package '{}' requires license acceptance but contains no License.txt",
                package
            ),
            PackageError::LicenseDeclined(package) => {
                write!(f, "License for package '{}' was not accepted", package)
            }
            PackageError::Clobber { package, conflicts } => write!(
                f,
                "Package '{}' exposes commands already provided by: {}. Remove --no-clobber to install anyway.",
                package,
                conflicts.join(", ")
            ),
            PackageError::DependentPackage {
                package,
                dependents,
            } => write!(
                f,
                "Cannot uninstall '{}': required by {}. Use --skip-dependency-check to remove it anyway.",
                package,
                dependents.join(", ")
            ),
            PackageError::PrivilegeRequired(what) => {
                write!(f, "Administrator rights are required to {}", what)
            }
        }
    }
}

impl std::error::Error for PackageError {}
