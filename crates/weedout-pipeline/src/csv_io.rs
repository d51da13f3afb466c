//! CSV reading and writing helpers shared by the engine adapter and the
//! publisher.

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result, ResultExt};

/// Number of rows polars inspects when inferring column types.
const INFER_SCHEMA_ROWS: usize = 1000;

/// Read a headered CSV file into a DataFrame.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))
        .context(format!("Failed to open {}", path.display()))?
        .finish()
        .context(format!("Failed to parse {}", path.display()))
}

/// Write a DataFrame to `path` with a header row, replacing any existing file.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| PipelineError::storage(format!("Failed to create {}", path.display()), e))?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .context(format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.csv");

        let mut df = df! {
            "id" => [1i64, 2, 3],
            "name" => ["a", "b", "c"],
        }
        .unwrap();

        write_csv(&mut df, &path).unwrap();
        let back = read_csv(&path).unwrap();

        assert_eq!(back.height(), 3);
        let names: Vec<String> = back.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_csv(&dir.path().join("absent.csv")).unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }
}
