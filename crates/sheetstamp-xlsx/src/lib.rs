//! # sheetstamp-xlsx
//!
//! Reads and patches XLSX template workbooks without re-generating them.
//!
//! A [`TemplateWorkbook`] keeps the original package in memory, answers cell
//! lookups from the worksheet XML and stages cell writes. On save only the
//! worksheets that received writes are rewritten; every other part of the
//! package (styles, drawings, printer settings, defined names) is copied
//! through untouched.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sheetstamp_xlsx::{CellReference, TemplateWorkbook};
//!
//! let mut workbook = TemplateWorkbook::open("invoice.xlsx").unwrap();
//! let label = CellReference::parse("A1").unwrap();
//! println!("{:?}", workbook.cell_value(&label).unwrap());
//!
//! workbook
//!     .set_cell_value(&CellReference::parse("Details!B2").unwrap(), "Acme")
//!     .unwrap();
//! workbook.save("invoice-filled.xlsx").unwrap();
//! ```

pub mod error;
mod escape;
pub mod package;
pub mod reference;
pub mod workbook;

mod patch;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{XlsxError, XlsxResult};
pub use package::Package;
pub use reference::{CellAddress, CellReference};
pub use workbook::TemplateWorkbook;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;
