use anyhow::Result;

use crate::{
    cleanup,
    error::PackageError,
    orchestrator::{Orchestrator, select_repositories},
    package::InstallScope,
    resolver::{ResolveOptions, ResolvedSet},
    runtime::Runtime,
};

use super::{build_requests, config::Config};

/// Show what installing `name` would pull in, from the first repository
/// that has it.
#[tracing::instrument(skip(config))]
pub async fn find<R: Runtime>(
    config: &Config<R>,
    name: &str,
    version: Option<&str>,
    repositories: &[String],
    prerelease: bool,
) -> Result<()> {
    let request = build_requests(&[name.to_string()], version)?.remove(0);
    let repositories = select_repositories(config.registry().list(&[])?, repositories)?;

    let factory = config.factory();
    let layout = config.read_layout(InstallScope::CurrentUser)?;
    let orchestrator = Orchestrator::new(&config.runtime, &factory, layout, cleanup::new_shared());

    let options = ResolveOptions {
        prerelease,
        ..Default::default()
    };
    match orchestrator.find(&request, &repositories, &options).await? {
        Some((entry, set)) => {
            print!("{}", render(&entry.name, &set));
            Ok(())
        }
        None => Err(PackageError::NotFound {
            name: request.to_string(),
            repository: "any registered repository".into(),
        }
        .into()),
    }
}

fn render(repository: &str, set: &ResolvedSet) -> String {
    let mut out = String::new();
    for package in &set.packages {
        match &package.parent {
            None => {
                out.push_str(&format!("{} [{}]\n", package.identity(), repository));
                if let Some(description) = &package.info.description {
                    out.push_str(&format!("  {}\n", description.trim()));
                }
            }
            Some(parent) => out.push_str(&format!(
                "  {} (required by {}, {})\n",
                package.identity(),
                parent,
                package.constraint_text()
            )),
        }
    }
    out
}
