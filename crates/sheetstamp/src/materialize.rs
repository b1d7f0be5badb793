//! Template materializer: copy a template and fill the copy

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use sheetstamp_xlsx::{TemplateWorkbook, XlsxError};

use crate::error::{Error, Result};
use crate::resolver;

/// Values to write, destination coordinate → text, in field order
pub type UserInputs = IndexMap<String, String>;

/// A cell that could not be written; the document is produced without it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWarning {
    pub coordinate: String,
    pub message: String,
}

impl fmt::Display for CellWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.coordinate, self.message)
    }
}

/// A generated document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub path: PathBuf,
    /// Number of cells written
    pub written: usize,
    pub warnings: Vec<CellWarning>,
}

/// Copy `template_path` to `output_path` and write `values` into the copy.
///
/// Cell-level failures become [`CellWarning`]s. If the copy cannot be
/// opened or saved the partially written output is removed and
/// [`Error::FileWrite`] is returned.
pub fn materialize(
    template_path: &Path,
    values: &UserInputs,
    output_path: &Path,
) -> Result<Materialized> {
    if !template_path.is_file() {
        return Err(Error::TemplateFileNotFound(template_path.to_path_buf()));
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| file_write(output_path, e.into()))?;
    }

    fs::copy(template_path, output_path).map_err(|e| file_write(output_path, e.into()))?;

    fill_copy(values, output_path).map_err(|e| {
        if let Err(cleanup) = fs::remove_file(output_path) {
            log::warn!(
                "Could not remove partial output {}: {}",
                output_path.display(),
                cleanup
            );
        }
        file_write(output_path, e)
    })
}

fn fill_copy(values: &UserInputs, output_path: &Path) -> std::result::Result<Materialized, XlsxError> {
    let mut workbook = TemplateWorkbook::open(output_path)?;
    let mut warnings = Vec::new();

    for (coordinate, value) in values.iter() {
        if let Err(e) = resolver::write(&mut workbook, coordinate, value) {
            let warning = CellWarning {
                coordinate: coordinate.to_string(),
                message: e.to_string(),
            };
            log::warn!("{}: {}", output_path.display(), warning);
            warnings.push(warning);
        }
    }

    let written = workbook.pending_writes();
    if written > 0 {
        workbook.save(output_path)?;
    }

    log::debug!(
        "Wrote {} cell(s) to {}",
        written,
        output_path.display()
    );

    Ok(Materialized {
        path: output_path.to_path_buf(),
        written,
        warnings,
    })
}

fn file_write(path: &Path, source: XlsxError) -> Error {
    Error::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}
