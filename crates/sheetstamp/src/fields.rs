//! Field listing for presentation layers

use sheetstamp_xlsx::TemplateWorkbook;

use crate::config::TemplateSpec;
use crate::error::{Error, Result};
use crate::resolver;

/// One input field of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Text of the label cell, or the label reference when it cannot be read
    pub label: String,
    /// Destination coordinate the answer is written to
    pub coordinate: String,
    /// Whether this field carries the serial number
    pub serial: bool,
}

/// Fields of a template in mapping order, labels read from the template
pub fn template_fields(spec: &TemplateSpec) -> Result<Vec<Field>> {
    let path = spec.resolved_path();
    if !path.is_file() {
        return Err(Error::TemplateFileNotFound(path.to_path_buf()));
    }

    let workbook = TemplateWorkbook::open(path)?;
    let serial_index = spec.serial_index();

    Ok(spec
        .mappings
        .iter()
        .enumerate()
        .map(|(i, (label_ref, target))| Field {
            label: resolver::read(&workbook, label_ref),
            coordinate: target.cell().to_string(),
            serial: serial_index == Some(i),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetstamp_xlsx::testing::WorkbookBuilder;
    use tempfile::TempDir;

    fn field(label: &str, coordinate: &str, serial: bool) -> Field {
        Field {
            label: label.to_string(),
            coordinate: coordinate.to_string(),
            serial,
        }
    }

    #[test]
    fn test_labels_in_mapping_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.xlsx");
        WorkbookBuilder::new()
            .sheet("Form")
            .sheet("Labels")
            .text("A1", "Customer")
            .text("A2", "Order no.")
            .write(&path)
            .unwrap();

        let spec = TemplateSpec::new(&path)
            .with_mapping("Labels!A2", "Form!C2")
            .with_mapping("Labels!A1", "Form!C1")
            .with_mapping("Gone!A1", "Form!C9");

        assert_eq!(
            template_fields(&spec).unwrap(),
            vec![
                field("Order no.", "Form!C2", false),
                field("Customer", "Form!C1", false),
                field("Gone!A1", "Form!C9", true),
            ]
        );
    }

    #[test]
    fn test_missing_or_invalid_template() {
        let dir = TempDir::new().unwrap();
        let spec = TemplateSpec::new(dir.path().join("absent.xlsx"));
        assert!(matches!(
            template_fields(&spec).unwrap_err(),
            Error::TemplateFileNotFound(_)
        ));

        let broken = dir.path().join("broken.xlsx");
        std::fs::write(&broken, "plain text").unwrap();
        assert!(matches!(
            template_fields(&TemplateSpec::new(&broken)).unwrap_err(),
            Error::Xlsx(_)
        ));
    }
}
