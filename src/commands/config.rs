use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use std::path::PathBuf;

use crate::{
    http::HttpClient,
    package::{InstallLayout, InstallScope, scope_dir, scope_root},
    repository::RepositoryRegistry,
    runtime::Runtime,
    source::FeedFactory,
};

/// Bearer token sent to remote feeds when set.
pub const API_KEY_VAR: &str = "MODGET_API_KEY";

const REGISTRY_FILE: &str = "repositories.json";

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub http: HttpClient,
    pub config_dir: PathBuf,
    pub root_override: Option<PathBuf>,
}

impl<R: Runtime> Config<R> {
    pub fn new(
        runtime: R,
        root_override: Option<PathBuf>,
        config_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(token) = runtime.env_var(API_KEY_VAR) {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
            debug!("Using {} for authentication: {}", API_KEY_VAR, mask(&token));
        }

        let client = Client::builder()
            .user_agent("modget-cli")
            .default_headers(headers)
            .build()?;

        let config_dir = match config_dir {
            Some(dir) => dir,
            None => runtime
                .config_dir()
                .context("Could not determine the configuration directory")?
                .join("modget"),
        };

        Ok(Self {
            runtime,
            http: HttpClient::new(client),
            config_dir,
            root_override,
        })
    }

    pub fn registry(&self) -> RepositoryRegistry<'_, R> {
        RepositoryRegistry::new(&self.runtime, self.config_dir.join(REGISTRY_FILE))
    }

    pub fn factory(&self) -> FeedFactory<'_, R> {
        FeedFactory::new(&self.runtime, self.http.clone())
    }

    /// Layout to install into; `AllUsers` needs elevation.
    pub fn layout(&self, scope: InstallScope) -> Result<InstallLayout> {
        let root = scope_root(&self.runtime, scope, self.root_override.as_deref())?;
        Ok(InstallLayout::under_root(&root))
    }

    /// Layout to read installed packages from.
    pub fn read_layout(&self, scope: InstallScope) -> Result<InstallLayout> {
        let root = scope_dir(&self.runtime, scope, self.root_override.as_deref())?;
        Ok(InstallLayout::under_root(&root))
    }
}

fn mask(token: &str) -> String {
    match (token.get(..4), token.get(token.len().saturating_sub(4)..)) {
        (Some(head), Some(tail)) if token.len() > 12 => format!("{}*********{}", head, tail),
        _ => "*********".to_string(),
    }
}
