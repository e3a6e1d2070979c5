use anyhow::{Context, Result, bail};
use log::debug;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

use crate::runtime::Runtime;

fn open_archive<R: Runtime>(runtime: &R, archive_path: &Path) -> Result<ZipArchive<Cursor<Vec<u8>>>> {
    let mut file = runtime
        .open(archive_path)
        .with_context(|| format!("Failed to open package {:?}", archive_path))?;

    // ZipArchive needs Read + Seek; Runtime::open only gives Read
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read package {:?}", archive_path))?;

    ZipArchive::new(Cursor::new(buffer))
        .with_context(|| format!("{:?} is not a valid package archive", archive_path))
}

/// Extract every entry of a `.nupkg` into `extract_to`, keeping the archive's
/// own layout (the package root is the archive root).
#[tracing::instrument(skip(runtime))]
pub fn extract<R: Runtime>(runtime: &R, archive_path: &Path, extract_to: &Path) -> Result<()> {
    let mut archive = open_archive(runtime, archive_path)?;
    if archive.len() == 0 {
        bail!("Package {:?} is empty", archive_path);
    }

    runtime.create_dir_all(extract_to)?;
    debug!("Extracting {:?} to {:?}...", archive_path, extract_to);

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read package entry {}", i))?;

        let Some(entry_path) = entry.enclosed_name() else {
            debug!("Skipping entry with unsafe path {:?}", entry.name());
            continue;
        };
        let full_path = extract_to.join(entry_path);

        if entry.is_dir() {
            runtime.create_dir_all(&full_path)?;
            continue;
        }

        if let Some(parent) = full_path.parent() {
            runtime.create_dir_all(parent)?;
        }
        let mut dest = runtime.create_file(&full_path)?;
        std::io::copy(&mut entry, &mut dest)
            .with_context(|| format!("Failed to extract {:?}", full_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode()
            && let Err(e) = runtime.set_permissions(&full_path, mode)
        {
            debug!("Failed to set permissions on {:?}: {}", full_path, e);
        }
    }

    Ok(())
}

/// Read the `.nuspec` manifest at the root of a `.nupkg`.
#[tracing::instrument(skip(runtime))]
pub fn read_manifest<R: Runtime>(runtime: &R, archive_path: &Path) -> Result<String> {
    let mut archive = open_archive(runtime, archive_path)?;

    let name = archive
        .file_names()
        .find(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec"))
        .map(String::from)
        .with_context(|| format!("Package {:?} has no .nuspec manifest", archive_path))?;

    let mut manifest = String::new();
    archive
        .by_name(&name)?
        .read_to_string(&mut manifest)
        .with_context(|| format!("Failed to read {} from {:?}", name, archive_path))?;
    Ok(manifest)
}
