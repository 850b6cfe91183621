//! Output layout, the WKT text writer and output size measurement

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;
use wkt::ToWkt;

use super::dataset::FeatureTable;

/// Where the writer puts the data and which path is reported back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Path handed to the writer
    pub write_path: PathBuf,
    /// Path reported in the result event
    pub result_path: PathBuf,
    /// Whether `bundle` created the folder (it did not exist before)
    created: bool,
}

impl OutputLayout {
    /// Single-file output: write and report the same path
    pub fn file(output: &Path) -> Self {
        Self {
            write_path: output.to_path_buf(),
            result_path: output.to_path_buf(),
            created: false,
        }
    }

    /// Directory bundle: `out/roads.shp` becomes `out/roads/roads.shp`,
    /// reporting `out/roads`. The directory is created.
    pub fn bundle(output: &Path) -> io::Result<Self> {
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        let stem = output.file_stem().unwrap_or_else(|| "output".as_ref());
        let folder = parent.join(stem);
        let created = !folder.exists();
        fs::create_dir_all(&folder)?;

        let file_name = output.file_name().unwrap_or_else(|| "output.shp".as_ref());
        Ok(Self {
            write_path: folder.join(file_name),
            result_path: folder,
            created,
        })
    }

    /// Undo a failed write: remove the bundle folder if this layout created
    /// it. Pre-existing folders and single-file layouts are left alone.
    pub fn discard(&self) {
        if !self.created {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.result_path) {
            debug!(
                "Could not remove output folder {}: {}",
                self.result_path.display(),
                err
            );
        }
    }

    pub fn is_bundle(&self) -> bool {
        self.write_path != self.result_path
    }
}

/// Write one WKT line per feature, in input order. Null geometries produce an
/// empty line.
pub fn write_wkt(table: &FeatureTable, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for feature in &table.features {
        if let Some(geometry) = &feature.geometry {
            writer.write_all(geometry.wkt_string().as_bytes())?;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Size measured after writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSize {
    File(u64),
    Bundle(u64),
}

/// Measure the written output: the file itself, or for bundles the recursive
/// sum of every file under the result directory.
pub fn measure_output(layout: &OutputLayout) -> io::Result<OutputSize> {
    if layout.is_bundle() {
        return directory_size(&layout.result_path).map(OutputSize::Bundle);
    }
    fs::metadata(&layout.write_path).map(|m| OutputSize::File(m.len()))
}

fn directory_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
