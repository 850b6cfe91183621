//! Input validation and dataset loading

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::dataset::FeatureTable;
use super::engine::EngineChain;
use crate::error::ConvertError;

/// Sidecar files a shapefile cannot be read without
const SHAPEFILE_SIDECARS: &[&str] = &[".shx", ".dbf"];

/// Fail with `InputNotFound` unless `path` exists
pub fn ensure_input_exists(path: &Path) -> Result<(), ConvertError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConvertError::InputNotFound(path.to_path_buf()))
    }
}

/// Return the mandatory shapefile sidecar extensions missing next to `shp_path`.
/// Both lower- and upper-case extensions are accepted.
pub fn missing_shapefile_sidecars(shp_path: &Path) -> Vec<String> {
    SHAPEFILE_SIDECARS
        .iter()
        .filter(|ext| {
            !sidecar_path(shp_path, ext).exists()
                && !sidecar_path(shp_path, &ext.to_uppercase()).exists()
        })
        .map(|ext| ext.to_string())
        .collect()
}

/// Fail with `MissingSidecars` when a shapefile is incomplete
pub fn ensure_shapefile_sidecars(shp_path: &Path) -> Result<(), ConvertError> {
    let missing = missing_shapefile_sidecars(shp_path);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConvertError::MissingSidecars {
            path: shp_path.to_path_buf(),
            missing,
        })
    }
}

fn sidecar_path(shp_path: &Path, ext: &str) -> PathBuf {
    let stem = shp_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    shp_path.with_file_name(format!("{}{}", stem, ext))
}

/// Size of the input in bytes, if it can be read
pub fn input_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Load a dataset through the engine chain. `source_format` is the declared
/// input format and takes precedence over the file extension.
pub fn load_dataset(engines: &EngineChain, path: &Path, source_format: &str) -> Result<FeatureTable> {
    engines
        .read(path, source_format)
        .with_context(|| format!("Failed to read {}", path.display()))
}
