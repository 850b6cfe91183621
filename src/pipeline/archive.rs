//! KMZ payload extraction into a scoped temporary directory

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;
use zip::ZipArchive;

use crate::error::ConvertError;

/// Name of the root document inside a KMZ archive
const ROOT_DOCUMENT: &str = "doc.kml";

/// An extracted KML document. The temporary directory holding it is removed
/// when this guard is dropped.
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    payload: PathBuf,
}

impl ExtractedArchive {
    /// Path to the extracted `.kml` file
    pub fn payload(&self) -> &Path {
        &self.payload
    }

    /// Directory the payload was extracted into
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Extract the KML document of `archive` into a fresh directory under `temp_root`.
///
/// A root-level `doc.kml` is preferred; otherwise the first `.kml` member in
/// archive order is used. On any error the temporary directory is removed
/// before returning.
pub fn extract_kml_payload(archive: &Path, temp_root: &Path) -> Result<ExtractedArchive, ConvertError> {
    let archive_err = |source| ConvertError::Archive {
        path: archive.to_path_buf(),
        source,
    };

    let file = File::open(archive).map_err(|e| archive_err(e.into()))?;
    let mut zip = ZipArchive::new(file).map_err(archive_err)?;

    let index = find_kml_member(&mut zip)
        .map_err(archive_err)?
        .ok_or_else(|| ConvertError::NoKmlPayload(archive.to_path_buf()))?;

    let dir = tempfile::Builder::new()
        .prefix("geoconvert-kmz-")
        .tempdir_in(temp_root)
        .map_err(|e| archive_err(e.into()))?;

    let mut entry = zip.by_index(index).map_err(archive_err)?;
    let file_name = Path::new(entry.name())
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| ROOT_DOCUMENT.into());
    let payload = dir.path().join(file_name);

    debug!("Extracting {} from {}", entry.name(), archive.display());
    let mut out = File::create(&payload).map_err(|e| archive_err(e.into()))?;
    io::copy(&mut entry, &mut out).map_err(|e| archive_err(e.into()))?;

    Ok(ExtractedArchive { dir, payload })
}

fn find_kml_member(zip: &mut ZipArchive<File>) -> zip::result::ZipResult<Option<usize>> {
    let mut first_kml = None;
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name();
        if name.eq_ignore_ascii_case(ROOT_DOCUMENT) {
            return Ok(Some(index));
        }
        if first_kml.is_none() && name.to_lowercase().ends_with(".kml") {
            first_kml = Some(index);
        }
    }
    Ok(first_kml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_kmz(path: &Path, members: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_prefers_root_doc_kml() {
        let work = TempDir::new().unwrap();
        let kmz = work.path().join("places.kmz");
        write_kmz(
            &kmz,
            &[("files/other.kml", "<other/>"), ("doc.kml", "<doc/>")],
        );

        let extracted = extract_kml_payload(&kmz, work.path()).unwrap();
        assert_eq!(extracted.payload().file_name().unwrap(), "doc.kml");
        assert_eq!(std::fs::read_to_string(extracted.payload()).unwrap(), "<doc/>");
    }

    #[test]
    fn test_uses_first_kml_member() {
        let work = TempDir::new().unwrap();
        let kmz = work.path().join("places.kmz");
        write_kmz(
            &kmz,
            &[("images/icon.png", "png"), ("layers/a.KML", "<a/>"), ("b.kml", "<b/>")],
        );

        let extracted = extract_kml_payload(&kmz, work.path()).unwrap();
        assert_eq!(extracted.payload().file_name().unwrap(), "a.KML");
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let work = TempDir::new().unwrap();
        let kmz = work.path().join("places.kmz");
        write_kmz(&kmz, &[("doc.kml", "<doc/>")]);

        let extracted = extract_kml_payload(&kmz, work.path()).unwrap();
        let dir = extracted.dir().to_path_buf();
        assert!(dir.exists());
        drop(extracted);
        assert!(!dir.exists());
    }

    #[test]
    fn test_archive_without_kml_fails_and_leaves_nothing() {
        let work = TempDir::new().unwrap();
        let root = work.path().join("tmp");
        std::fs::create_dir(&root).unwrap();
        let kmz = work.path().join("empty.kmz");
        write_kmz(&kmz, &[("readme.txt", "nothing here")]);

        let err = extract_kml_payload(&kmz, &root).unwrap_err();
        assert!(matches!(err, ConvertError::NoKmlPayload(_)));
        assert!(err.to_string().contains("does not contain a .kml document"));
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_non_zip_input_is_archive_error() {
        let work = TempDir::new().unwrap();
        let kmz = work.path().join("broken.kmz");
        std::fs::write(&kmz, "not a zip").unwrap();

        let err = extract_kml_payload(&kmz, work.path()).unwrap_err();
        assert!(matches!(err, ConvertError::Archive { .. }));
    }
}
