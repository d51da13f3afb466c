//! In-memory download archives.

use std::fs::File;
use std::io::{self, Cursor};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PipelineError, Result};

/// Name of the single entry in every archive, independent of the upload name.
pub const ARCHIVE_ENTRY_NAME: &str = "data.csv";

/// File name offered to the client for the archive itself.
pub const ARCHIVE_DOWNLOAD_NAME: &str = "processed_data.zip";

/// Bundle `artifact` into a single-entry, deflate-compressed zip.
///
/// Nothing touches the disk except reading the artifact.
pub fn build_zip(artifact: &Path) -> Result<Vec<u8>> {
    let mut file = match File::open(artifact) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PipelineError::NotFound {
                requested: artifact.display().to_string(),
                available: Vec::new(),
            });
        }
        Err(e) => {
            return Err(PipelineError::storage(
                format!("Failed to open {}", artifact.display()),
                e,
            ));
        }
    };

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(ARCHIVE_ENTRY_NAME, options)?;
    io::copy(&mut file, &mut zip)?;

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn test_entry_is_always_data_csv() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("processed_quarterly report (final).csv");
        fs::write(&artifact, "id,y\n1,0\n").unwrap();

        let bytes = build_zip(&artifact).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "data.csv");

        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "id,y\n1,0\n");
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = build_zip(&dir.path().join("gone.csv")).unwrap_err();
        assert!(err.is_not_found());
    }
}
