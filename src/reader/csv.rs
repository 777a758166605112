//! CSV sources
//!
//! A CSV descriptor either carries the file content inline (`csvContent`) or
//! names a file (`csvPath`). Files are looked up in the uploads directory by
//! file name first, then at the literal path. Parsing goes through polars so
//! column types (integers, floats, booleans, ISO dates) are inferred from
//! every row of the file.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::debug;

use super::connection::CsvConfig;
use crate::{AskdbError, Result};

/// A located CSV source, ready to be parsed
#[derive(Debug, Clone, PartialEq)]
pub enum CsvSource {
    Inline(String),
    File(PathBuf),
}

impl CsvSource {
    /// Decide where the CSV comes from.
    ///
    /// Inline content wins over a path. A path is resolved against
    /// `uploads_dir` by file name; if that file does not exist the path is
    /// used as given.
    pub fn locate(config: &CsvConfig, uploads_dir: &Path) -> Result<Self> {
        if let Some(content) = &config.csv_content {
            return Ok(CsvSource::Inline(content.clone()));
        }

        let csv_path = config
            .csv_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AskdbError::SourceNotFound("CSV path or content required".to_string()))?;

        let literal = Path::new(csv_path);
        let file_name = literal
            .file_name()
            .ok_or_else(|| AskdbError::SourceNotFound(format!("Invalid CSV path: {}", csv_path)))?;
        let uploaded = uploads_dir.join(file_name);

        if uploaded.is_file() {
            debug!("Using uploaded CSV {}", uploaded.display());
            Ok(CsvSource::File(uploaded))
        } else if literal.is_file() {
            debug!("Using CSV at literal path {}", literal.display());
            Ok(CsvSource::File(literal.to_path_buf()))
        } else {
            Err(AskdbError::SourceNotFound(format!(
                "CSV file not found at {}",
                uploaded.display()
            )))
        }
    }

    /// Parse the CSV into a DataFrame (header row required)
    pub fn read(&self) -> Result<DataFrame> {
        match self {
            CsvSource::Inline(content) => {
                if content.trim().is_empty() {
                    return Err(AskdbError::SourceNotFound("CSV content is empty".to_string()));
                }
                read_options()
                    .into_reader_with_file_handle(Cursor::new(content.clone().into_bytes()))
                    .finish()
                    .map_err(|e| AskdbError::SourceNotFound(format!("Failed to parse CSV content: {}", e)))
            }
            CsvSource::File(path) => read_options()
                .try_into_reader_with_file_path(Some(path.clone()))
                .and_then(|reader| reader.finish())
                .map_err(|e| {
                    AskdbError::SourceNotFound(format!(
                        "Failed to read CSV {}: {}",
                        path.display(),
                        e
                    ))
                }),
        }
    }
}

fn read_options() -> CsvReadOptions {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| opts.with_try_parse_dates(true))
}
