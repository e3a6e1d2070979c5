use anyhow::Result;

use crate::{repository::RepositoryEntry, runtime::Runtime};

use super::config::Config;

/// Register a repository.
#[tracing::instrument(skip(config))]
pub fn repo_add<R: Runtime>(
    config: &Config<R>,
    name: &str,
    url: &str,
    priority: u8,
    trusted: bool,
) -> Result<()> {
    let entry = config.registry().add(name, url, priority, trusted)?;
    println!("Registered {}", entry);
    Ok(())
}

/// Change the url, priority or trust of a registered repository.
#[tracing::instrument(skip(config))]
pub fn repo_set<R: Runtime>(
    config: &Config<R>,
    name: &str,
    url: Option<&str>,
    priority: Option<u8>,
    trusted: Option<bool>,
) -> Result<()> {
    let entry = config.registry().update(name, url, priority, trusted)?;
    println!("Updated {}", entry);
    Ok(())
}

#[tracing::instrument(skip(config))]
pub fn repo_remove<R: Runtime>(config: &Config<R>, names: &[String]) -> Result<()> {
    config.registry().remove(names)?;
    for name in names {
        println!("Removed {}", name);
    }
    Ok(())
}

/// Print registered repositories in priority order.
#[tracing::instrument(skip(config))]
pub fn repo_list<R: Runtime>(config: &Config<R>, names: &[String]) -> Result<()> {
    let entries = config.registry().list(names)?;
    if entries.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }
    print!("{}", render(&entries));
    Ok(())
}

fn render(entries: &[RepositoryEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or_default()
        .max("NAME".len());

    let mut out = format!("{:<width$}  PRIORITY  TRUSTED  URL\n", "NAME");
    for entry in entries {
        out.push_str(&format!(
            "{:<width$}  {:>8}  {:<7}  {}\n",
            entry.name,
            entry.priority,
            if entry.trusted { "yes" } else { "no" },
            entry.url
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{DEFAULT_REPOSITORY_NAME, MAX_PRIORITY};
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config<RealRuntime> {
        Config::new(RealRuntime, None, Some(dir.to_path_buf())).unwrap()
    }

    #[test]
    fn test_add_set_remove() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());

        repo_add(&config, "Local", "/srv/feed", 0, true).unwrap();
        assert!(repo_add(&config, "local", "/srv/other", 1, false).is_err());

        repo_set(&config, "Local", None, Some(5), Some(false)).unwrap();
        let entries = config.registry().list(&["Local".into()]).unwrap();
        assert_eq!(entries[0].priority, 5);
        assert!(!entries[0].trusted);

        repo_remove(&config, &["Local".into()]).unwrap();
        let names: Vec<String> = config
            .registry()
            .list(&[])
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![DEFAULT_REPOSITORY_NAME]);

        assert!(repo_list(&config, &[]).is_ok());
    }

    #[test]
    fn test_render() {
        let entries = vec![
            RepositoryEntry {
                name: "Local".into(),
                url: "/srv/feed".into(),
                priority: 0,
                trusted: true,
            },
            RepositoryEntry {
                name: "Gallery".into(),
                url: "https://example.org/v3".into(),
                priority: MAX_PRIORITY,
                trusted: false,
            },
        ];

        assert_eq!(
            render(&entries),
            "NAME     PRIORITY  TRUSTED  URL\n\
             Local           0  yes      /srv/feed\n\
             Gallery        50  no       https://example.org/v3\n"
        );
    }
}
