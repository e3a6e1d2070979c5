use anyhow::Result;
use clap::Parser;
use modget::commands::{self, config::Config};
use modget::package::InstallScope;
use modget::repository::MAX_PRIORITY;
use modget::transaction::InstallOptions;
use std::path::PathBuf;

/// modget - module package manager
///
/// Install modules and scripts, with their dependencies, from NuGet v3 feeds
/// and local directories of .nupkg files.
///
/// If the MODGET_API_KEY environment variable is set, it is sent to remote
/// feeds as a bearer token.
///
/// Examples:
///   modget repo add Local /srv/packages --priority 0 --trusted
///   modget install Pester --version "[5.0,6.0)"
///   modget save Pester --path ./vendor
#[derive(Parser, Debug)]
#[command(author, version = env!("MODGET_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides the scope root; also via MODGET_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "MODGET_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Directory holding the repository list (also via MODGET_CONFIG_DIR)
    #[arg(
        long = "config-dir",
        env = "MODGET_CONFIG_DIR",
        value_name = "PATH",
        global = true
    )]
    pub config_dir: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage the registered repositories
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Install packages and their dependencies
    Install(InstallArgs),

    /// Download packages and their dependencies into a directory
    Save(SaveArgs),

    /// Show what installing a package would pull in
    Find(FindArgs),

    /// List installed packages
    List(ListArgs),

    /// Remove installed packages
    Uninstall(UninstallArgs),
}

#[derive(clap::Subcommand, Debug)]
enum RepoCommands {
    /// Register a repository
    Add(RepoAddArgs),

    /// Change a registered repository
    Set(RepoSetArgs),

    /// Unregister repositories
    Remove(RepoRemoveArgs),

    /// List registered repositories in priority order
    List(RepoListArgs),
}

#[derive(clap::Args, Debug)]
pub struct RepoAddArgs {
    pub name: String,

    /// Feed URL (https://...) or directory of .nupkg files
    pub url: String,

    /// Lower values are searched first
    #[arg(long, default_value_t = MAX_PRIORITY)]
    pub priority: u8,

    /// Install from this repository without asking
    #[arg(long)]
    pub trusted: bool,
}

#[derive(clap::Args, Debug)]
pub struct RepoSetArgs {
    pub name: String,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub priority: Option<u8>,

    #[arg(long, value_name = "true|false")]
    pub trusted: Option<bool>,
}

#[derive(clap::Args, Debug)]
pub struct RepoRemoveArgs {
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct RepoListArgs {
    /// Name patterns (wildcards allowed)
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct Selection {
    /// Package names
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<String>,

    /// Exact version or range such as "[1.0,2.0)"
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Only use these repositories (wildcards allowed)
    #[arg(long = "repository", value_name = "NAME")]
    pub repositories: Vec<String>,

    /// Consider pre-release versions
    #[arg(long)]
    pub prerelease: bool,

    /// Use untrusted repositories without asking
    #[arg(long)]
    pub trust: bool,

    /// Same as --trust
    #[arg(long)]
    pub force: bool,

    /// Do not resolve dependencies
    #[arg(long)]
    pub skip_dependency_check: bool,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// CurrentUser or AllUsers
    #[arg(long, default_value = "CurrentUser")]
    pub scope: InstallScope,

    /// Install again even if the version is already present
    #[arg(long)]
    pub reinstall: bool,

    /// Refuse packages exporting commands that installed packages already export
    #[arg(long)]
    pub no_clobber: bool,

    /// Accept package licenses without prompting
    #[arg(long)]
    pub accept_license: bool,
}

#[derive(clap::Args, Debug)]
pub struct SaveArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// Existing directory to save into
    #[arg(long, value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct FindArgs {
    pub name: String,

    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    #[arg(long = "repository", value_name = "NAME")]
    pub repositories: Vec<String>,

    #[arg(long)]
    pub prerelease: bool,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Name patterns (wildcards allowed)
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    #[arg(long, default_value = "CurrentUser")]
    pub scope: InstallScope,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<String>,

    /// Only this version or range
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    #[arg(long, default_value = "CurrentUser")]
    pub scope: InstallScope,

    /// Remove even if installed packages depend on it
    #[arg(long)]
    pub skip_dependency_check: bool,
}

impl Selection {
    fn options(&self) -> InstallOptions {
        InstallOptions {
            prerelease: self.prerelease,
            trust_repository: self.trust,
            force: self.force,
            skip_dependency_check: self.skip_dependency_check,
            ..Default::default()
        }
    }
}

impl InstallArgs {
    fn options(&self) -> InstallOptions {
        InstallOptions {
            reinstall: self.reinstall,
            no_clobber: self.no_clobber,
            accept_license: self.accept_license,
            ..self.selection.options()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = Config::new(modget::runtime::RealRuntime, cli.install_root, cli.config_dir)?;

    match cli.command {
        Commands::Repo(RepoCommands::Add(args)) => {
            commands::repo_add(&config, &args.name, &args.url, args.priority, args.trusted)?
        }
        Commands::Repo(RepoCommands::Set(args)) => commands::repo_set(
            &config,
            &args.name,
            args.url.as_deref(),
            args.priority,
            args.trusted,
        )?,
        Commands::Repo(RepoCommands::Remove(args)) => commands::repo_remove(&config, &args.names)?,
        Commands::Repo(RepoCommands::List(args)) => commands::repo_list(&config, &args.names)?,
        Commands::Install(args) => {
            let options = args.options();
            let selection = &args.selection;
            commands::install(
                &config,
                &selection.names,
                selection.version.as_deref(),
                &selection.repositories,
                args.scope,
                options,
            )
            .await?
        }
        Commands::Save(args) => {
            let selection = &args.selection;
            commands::save(
                &config,
                &selection.names,
                selection.version.as_deref(),
                &selection.repositories,
                &args.path,
                selection.options(),
            )
            .await?
        }
        Commands::Find(args) => {
            commands::find(
                &config,
                &args.name,
                args.version.as_deref(),
                &args.repositories,
                args.prerelease,
            )
            .await?
        }
        Commands::List(args) => commands::list(&config, &args.names, args.scope)?,
        Commands::Uninstall(args) => commands::uninstall(
            &config,
            &args.names,
            args.version.as_deref(),
            args.scope,
            args.skip_dependency_check,
        )?,
    }
    Ok(())
}
