//! `.nupkg` archives (zip files with a `.nuspec` manifest at the root).

mod nupkg;

pub use nupkg::{extract, read_manifest};
