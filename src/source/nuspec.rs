//! `.nuspec` manifest parsing.

use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::package::{Dependency, PackageInfo};

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        (attr.key.local_name().as_ref() == name.as_bytes())
            .then(|| String::from_utf8_lossy(&attr.value).trim().to_string())
    })
}

fn push_dependency(dependencies: &mut Vec<Dependency>, e: &BytesStart) {
    let Some(id) = attribute(e, "id").filter(|id| !id.is_empty()) else {
        return;
    };
    // The same dependency repeats once per target framework group
    if dependencies.iter().any(|d| d.id.eq_ignore_ascii_case(&id)) {
        return;
    }
    let range = attribute(e, "version").filter(|v| !v.is_empty());
    dependencies.push(Dependency::new(id, range.as_deref()));
}

/// Parse a manifest into [`PackageInfo`]. `content_location` is left empty
/// for the caller to fill in.
pub fn parse(xml: &str) -> Result<PackageInfo> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut info = PackageInfo::default();
    let mut id = None;
    let mut version = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                if name == "dependency" && path.iter().any(|p| p == "dependencies") {
                    push_dependency(&mut info.dependencies, e);
                }
                path.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if local_name(e) == "dependency" && path.iter().any(|p| p == "dependencies") {
                    push_dependency(&mut info.dependencies, e);
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                // Only direct children of <metadata> carry scalar fields
                let in_metadata = path.len() >= 2 && path[path.len() - 2] == "metadata";
                if !in_metadata {
                    continue;
                }
                let text = e
                    .unescape()
                    .context("Invalid text in package manifest")?
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }

                match path.last().map(String::as_str) {
                    Some("id") => id = Some(text),
                    Some("version") => version = Some(text),
                    Some("description") => info.description = Some(text),
                    Some("authors") => info.authors = Some(text),
                    Some("projectUrl") => info.project_url = Some(text),
                    Some("licenseUrl") => info.license_url = Some(text),
                    Some("requireLicenseAcceptance") => {
                        info.require_license_acceptance = text.eq_ignore_ascii_case("true")
                    }
                    Some("tags") => {
                        info.tags = text.split_whitespace().map(String::from).collect();
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(anyhow!(
                    "Invalid package manifest at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
        }
    }

    info.id = id.ok_or_else(|| anyhow!("Package manifest has no <id>"))?;
    let version = version.ok_or_else(|| anyhow!("Package manifest for {} has no <version>", info.id))?;
    info.version = version
        .parse()
        .with_context(|| format!("Package manifest for {} has an invalid version", info.id))?;
    Ok(info)
}
