//! # sheetstamp
//!
//! Fill spreadsheet templates from a JSON configuration and stamp out
//! serially numbered copies.
//!
//! A [`Configuration`] maps categories to templates; each template names an
//! `.xlsx` file and an ordered list of label cell → destination cell
//! mappings. A front end lists a template's [`Field`]s, collects values for
//! them and hands them to [`generate`], which writes one filled copy per
//! requested document with `{base}-{n}` in the serial field.
//!
//! ## Features
//!
//! - Template files are copied byte for byte; only the written cells change
//! - Labels are read best-effort, falling back to the label reference
//! - Serial counters persist per base serial across runs
//! - Cell-level problems are reported as warnings, never abort a document
//!
//! ## Example
//!
//! ```rust,no_run
//! use sheetstamp::prelude::*;
//!
//! let config_path = std::path::Path::new("config.json");
//! let mut config = Configuration::load(config_path).unwrap();
//!
//! let spec = config.template("Invoices", "Standard").unwrap();
//! for field in template_fields(spec).unwrap() {
//!     println!("{} -> {}", field.label, field.coordinate);
//! }
//!
//! let request = BatchRequest::new("Invoices", "Standard", "out")
//!     .with_input("B2", "Acme")
//!     .with_input("B3", "INV")
//!     .with_quantity(3);
//! let outcome = generate_and_save(&mut config, config_path, &request).unwrap();
//! println!("{:?}", outcome.files);
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod fields;
pub mod materialize;
pub mod naming;
pub mod prelude;
pub mod resolver;

pub use batch::{fill_document, generate, generate_and_save, parse_quantity, BatchOutcome, BatchRequest};
pub use config::{Configuration, MappingTarget, SerialCounters, TemplateSpec};
pub use error::{Error, Result};
pub use fields::{template_fields, Field};
pub use materialize::{materialize, CellWarning, Materialized, UserInputs};
pub use naming::{serial_file_name, timestamped_file_name};

pub use sheetstamp_xlsx::{CellReference, TemplateWorkbook, XlsxError};
