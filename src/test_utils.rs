//! Fixtures shared by unit tests: `.nupkg` builders and feed directories.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::FileOptions;

use crate::runtime::{MockRuntime, RealRuntime, Runtime};

/// Render a minimal `.nuspec` manifest.
pub fn nuspec(id: &str, version: &str, dependencies: &[(&str, &str)], tags: &[&str]) -> String {
    TestPackage::new(id, version)
        .dependencies(dependencies)
        .tags(tags)
        .manifest()
}

/// Write a `.nupkg` holding `manifest`, the given files, and the usual
/// packaging side files.
pub fn write_nupkg(path: &Path, manifest: &str, files: &[(&str, &str)]) {
    let id = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or("package");

    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options: FileOptions<()> = FileOptions::default();

    zip.start_file(format!("{}.nuspec", id), options).unwrap();
    zip.write_all(manifest.as_bytes()).unwrap();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types />").unwrap();
    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(b"<Relationships />").unwrap();
    zip.start_file("package/services/metadata/core-properties/x.psmdcp", options)
        .unwrap();
    zip.write_all(b"<coreProperties />").unwrap();

    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Builder for a package placed in a local feed directory.
#[derive(Debug, Clone)]
pub struct TestPackage {
    id: String,
    version: String,
    dependencies: Vec<(String, Option<String>)>,
    tags: Vec<String>,
    require_license: bool,
    files: Vec<(String, String)>,
}

impl TestPackage {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
            tags: Vec::new(),
            require_license: false,
            files: vec![(format!("{}.psd1", id), "@{}".to_string())],
        }
    }

    pub fn dependencies(mut self, dependencies: &[(&str, &str)]) -> Self {
        self.dependencies = dependencies
            .iter()
            .map(|(id, range)| {
                let range = (!range.is_empty()).then(|| range.to_string());
                (id.to_string(), range)
            })
            .collect();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn require_license(mut self) -> Self {
        self.require_license = true;
        self
    }

    pub fn file(mut self, name: &str, content: &str) -> Self {
        self.files.push((name.to_string(), content.to_string()));
        self
    }

    /// Replace the default module manifest with a `<Id>.ps1` script.
    pub fn script(mut self) -> Self {
        self.files = vec![(format!("{}.ps1", self.id), "Write-Output 'hi'".to_string())];
        self
    }

    pub fn manifest(&self) -> String {
        let dependencies: String = self
            .dependencies
            .iter()
            .map(|(id, range)| match range {
                Some(range) => format!(r#"<dependency id="{}" version="{}" />"#, id, range),
                None => format!(r#"<dependency id="{}" />"#, id),
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2011/08/nuspec.xsd">
  <metadata>
    <id>{}</id>
    <version>{}</version>
    <authors>Test Author</authors>
    <description>{} test package</description>
    <requireLicenseAcceptance>{}</requireLicenseAcceptance>
    <tags>{}</tags>
    <dependencies>{}</dependencies>
  </metadata>
</package>"#,
            self.id,
            self.version,
            self.id,
            self.require_license,
            self.tags.join(" "),
            dependencies
        )
    }

    /// Write `<dir>/<Id>.<Version>.nupkg` and return its path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(format!("{}.{}.nupkg", self.id, self.version));
        let files: Vec<(&str, &str)> = self
            .files
            .iter()
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();
        write_nupkg(&path, &self.manifest(), &files);
        path
    }
}

/// A `MockRuntime` backed by the real filesystem, with temp, data and config
/// directories under `sandbox` and every prompt answered with `answer`.
pub fn sandbox_runtime(sandbox: &Path, answer: bool) -> MockRuntime {
    faulty_runtime(sandbox, answer, |_, _| false)
}

/// Like [`sandbox_runtime`], but `write`, `rename` and `copy` fail whenever
/// `fails(operation, source_path)` says so.
pub fn faulty_runtime(
    sandbox: &Path,
    answer: bool,
    fails: fn(&str, &Path) -> bool,
) -> MockRuntime {
    let mut runtime = MockRuntime::new();
    let temp = sandbox.join("tmp");
    let data = sandbox.join("data");
    let config = sandbox.join("config");
    let shared = sandbox.join("shared");

    runtime.expect_env_var().returning(|k| RealRuntime.env_var(k));
    runtime.expect_write().returning(move |p, c| {
        if fails("write", p) {
            anyhow::bail!("cannot write {:?}", p);
        }
        RealRuntime.write(p, c)
    });
    runtime
        .expect_read_to_string()
        .returning(|p| RealRuntime.read_to_string(p));
    runtime.expect_rename().returning(move |f, t| {
        if fails("rename", f) {
            anyhow::bail!("cannot move {:?} across devices", f);
        }
        RealRuntime.rename(f, t)
    });
    runtime.expect_copy().returning(move |f, t| {
        if fails("copy", f) {
            anyhow::bail!("cannot copy {:?}", f);
        }
        RealRuntime.copy(f, t)
    });
    runtime
        .expect_create_dir_all()
        .returning(|p| RealRuntime.create_dir_all(p));
    runtime
        .expect_remove_file()
        .returning(|p| RealRuntime.remove_file(p));
    runtime.expect_remove_dir().returning(|p| RealRuntime.remove_dir(p));
    runtime.expect_exists().returning(|p| RealRuntime.exists(p));
    runtime.expect_read_dir().returning(|p| RealRuntime.read_dir(p));
    runtime
        .expect_create_file()
        .returning(|p| RealRuntime.create_file(p));
    runtime.expect_open().returning(|p| RealRuntime.open(p));
    runtime
        .expect_remove_dir_all()
        .returning(|p| RealRuntime.remove_dir_all(p));
    runtime.expect_is_dir().returning(|p| RealRuntime.is_dir(p));
    runtime
        .expect_set_permissions()
        .returning(|p, m| RealRuntime.set_permissions(p, m));
    runtime
        .expect_create_unique_dir()
        .returning(|p, prefix| RealRuntime.create_unique_dir(p, prefix));
    runtime
        .expect_config_dir()
        .returning(move || Some(config.clone()));
    runtime.expect_data_dir().returning(move || Some(data.clone()));
    runtime
        .expect_shared_data_dir()
        .returning(move || Some(shared.clone()));
    runtime.expect_temp_dir().returning(move || temp.clone());
    runtime.expect_is_privileged().returning(|| false);
    runtime.expect_confirm().returning(move |_| Ok(answer));
    runtime
}

/// Names of the entries directly under `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
