//! Cell resolver: best-effort label reads and skip-on-empty writes

use sheetstamp_xlsx::{CellReference, TemplateWorkbook, XlsxResult};

/// Current value of the cell `reference` points at.
///
/// An empty cell reads as `""`. Any failure (bad syntax, unknown sheet,
/// unreadable worksheet) yields `reference` itself; the value is only a
/// displayed label.
pub fn read(workbook: &TemplateWorkbook, reference: &str) -> String {
    let lookup = CellReference::parse(reference).and_then(|r| workbook.cell_value(&r));

    match lookup {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            log::debug!("Label '{}' unresolved: {}", reference, e);
            reference.to_string()
        }
    }
}

/// Stage `value` into the cell at `coordinate`.
///
/// Empty values are skipped so the template's content stays in place;
/// returns whether a write was staged.
pub fn write(workbook: &mut TemplateWorkbook, coordinate: &str, value: &str) -> XlsxResult<bool> {
    if value.is_empty() {
        log::debug!("Skipping {}: no value", coordinate);
        return Ok(false);
    }

    let reference = CellReference::parse(coordinate)?;
    workbook.set_cell_value(&reference, value)?;
    Ok(true)
}
