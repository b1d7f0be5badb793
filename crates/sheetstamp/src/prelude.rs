//! Common imports for sheetstamp users
//!
//! ```rust
//! use sheetstamp::prelude::*;
//! ```

pub use crate::{
    // Configuration
    Configuration,
    MappingTarget,
    TemplateSpec,
    UserInputs,

    // Generation
    fill_document,
    generate,
    generate_and_save,
    parse_quantity,
    template_fields,
    BatchOutcome,
    BatchRequest,
    CellWarning,
    Field,
    Materialized,

    // Error types
    Error,
    Result,
};
