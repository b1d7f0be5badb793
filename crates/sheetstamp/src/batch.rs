//! Batch generation with serial numbering

use std::path::{Path, PathBuf};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::materialize::{materialize, CellWarning, Materialized, UserInputs};
use crate::naming::serial_file_name;

/// One generation request
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub category: String,
    pub template: String,
    /// Destination coordinate → value, including the base serial
    pub inputs: UserInputs,
    pub quantity: u32,
    pub output_dir: PathBuf,
}

impl BatchRequest {
    pub fn new<C, T, P>(category: C, template: T, output_dir: P) -> Self
    where
        C: Into<String>,
        T: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            category: category.into(),
            template: template.into(),
            inputs: UserInputs::new(),
            quantity: 1,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_input<V: Into<String>>(mut self, coordinate: &str, value: V) -> Self {
        self.inputs.insert(coordinate.to_string(), value.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Result of a successful batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Generated files in generation order
    pub files: Vec<PathBuf>,
    /// Serial written into each file, parallel to `files`
    pub serials: Vec<String>,
    pub warnings: Vec<CellWarning>,
}

/// Parse a user-typed quantity; must be a positive whole number
pub fn parse_quantity(raw: &str) -> Result<u32> {
    let raw = raw.trim();
    let quantity: i64 = raw
        .parse()
        .map_err(|_| Error::invalid_input(format!("quantity '{}' is not a number", raw)))?;

    if quantity < 1 {
        return Err(Error::invalid_input(format!(
            "quantity must be at least 1, got {}",
            quantity
        )));
    }

    u32::try_from(quantity)
        .map_err(|_| Error::invalid_input(format!("quantity {} is too large", quantity)))
}

/// Generate `request.quantity` serially numbered copies of a template.
///
/// The serial field receives `{base}-{n}` where `base` is the user's value
/// for that field and `n` continues the persisted counter for `base`.
/// Counters in `config` are updated only when every copy was written; on a
/// failure partway through, [`Error::BatchAborted`] lists the files already
/// on disk and the counters are left as they were. The caller persists the
/// configuration (see [`generate_and_save`]).
pub fn generate(config: &mut Configuration, request: &BatchRequest) -> Result<BatchOutcome> {
    let spec = config.template(&request.category, &request.template)?;

    let serial_cell = spec
        .serial_target()
        .ok_or_else(|| {
            Error::invalid_input(format!(
                "template '{}' has no field mappings",
                request.template
            ))
        })?
        .to_string();

    let base = request
        .inputs
        .get(&serial_cell)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            Error::invalid_input(format!("a serial number is required in {}", serial_cell))
        })?;

    if request.quantity == 0 {
        return Err(Error::invalid_input("quantity must be at least 1"));
    }

    let template_path = spec.resolved_path().to_path_buf();
    if !template_path.is_file() {
        return Err(Error::TemplateFileNotFound(template_path));
    }

    log::info!(
        "Generating {} cop{} of {} / {} (serial {})",
        request.quantity,
        if request.quantity == 1 { "y" } else { "ies" },
        request.category,
        request.template,
        base
    );

    let mut count = config.serial_numbers.get(base);
    let mut outcome = BatchOutcome::default();

    for _ in 0..request.quantity {
        count += 1;
        let serial = format!("{}-{}", base, count);

        let mut values = request.inputs.clone();
        values.insert(serial_cell.clone(), serial.clone());

        let output = request
            .output_dir
            .join(serial_file_name(&request.template, &serial));
        log::debug!("Writing {}", output.display());

        match materialize(&template_path, &values, &output) {
            Ok(Materialized { path, warnings, .. }) => {
                outcome.files.push(path);
                outcome.serials.push(serial);
                outcome.warnings.extend(warnings);
            }
            Err(e) => {
                log::error!(
                    "Batch stopped after {} file(s): {}",
                    outcome.files.len(),
                    e
                );
                return Err(Error::BatchAborted {
                    completed: outcome.files,
                    source: Box::new(e),
                });
            }
        }
    }

    config.serial_numbers.set(base, count);
    log::info!(
        "Generated {} file(s), counter for {} now {}",
        outcome.files.len(),
        base,
        count
    );

    Ok(outcome)
}

/// [`generate`], then save the updated counters to `config_path`
pub fn generate_and_save(
    config: &mut Configuration,
    config_path: &Path,
    request: &BatchRequest,
) -> Result<BatchOutcome> {
    let outcome = generate(config, request)?;
    config.save(config_path)?;
    Ok(outcome)
}

/// Fill a single document at an explicit path, without serial numbering
pub fn fill_document(
    config: &Configuration,
    category: &str,
    template: &str,
    inputs: &UserInputs,
    output_path: &Path,
) -> Result<Materialized> {
    let spec = config.template(category, template)?;
    log::info!(
        "Filling {} / {} into {}",
        category,
        template,
        output_path.display()
    );
    materialize(spec.resolved_path(), inputs, output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSpec;
    use pretty_assertions::assert_eq;
    use sheetstamp_xlsx::testing::WorkbookBuilder;
    use tempfile::TempDir;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("3").unwrap(), 3);
        assert_eq!(parse_quantity("  12 \n").unwrap(), 12);

        for bad in ["0", "-2", "abc", "", "1.5", "99999999999"] {
            assert!(
                matches!(parse_quantity(bad), Err(Error::InvalidInput(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    fn setup(dir: &Path) -> Configuration {
        let template = dir.join("form.xlsx");
        WorkbookBuilder::new()
            .text("A1", "Customer")
            .text("A2", "Serial")
            .write(&template)
            .unwrap();

        let mut config = Configuration::default();
        config.insert_template(
            "Cat",
            "Order Form",
            TemplateSpec::new(&template)
                .with_mapping("A1", "B1")
                .with_mapping("A2", "B2"),
        );
        config
    }

    #[test]
    fn test_generate_continues_counter() {
        let dir = TempDir::new().unwrap();
        let mut config = setup(dir.path());
        config.serial_numbers.set("S", 4);

        let request = BatchRequest::new("Cat", "Order Form", dir.path().join("out"))
            .with_input("B1", "Acme")
            .with_input("B2", "S")
            .with_quantity(2);
        let outcome = generate(&mut config, &request).unwrap();

        assert_eq!(outcome.serials, vec!["S-5", "S-6"]);
        assert_eq!(
            outcome.files,
            vec![
                dir.path().join("out").join("Order_Form_S-5.xlsx"),
                dir.path().join("out").join("Order_Form_S-6.xlsx"),
            ]
        );
        assert_eq!(config.serial_numbers.get("S"), 6);
    }

    #[test]
    fn test_base_serial_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let mut config = setup(dir.path());

        let request = BatchRequest::new("Cat", "Order Form", dir.path()).with_input("B2", "  S ");
        let outcome = generate(&mut config, &request).unwrap();

        assert_eq!(outcome.serials, vec!["S-1"]);
        assert_eq!(outcome.files, vec![dir.path().join("Order_Form_S-1.xlsx")]);
        assert_eq!(config.serial_numbers.get("S"), 1);
        assert_eq!(config.serial_numbers.get("  S "), 0);
    }

    #[test]
    fn test_rejected_requests_write_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut config = setup(dir.path());

        let missing_serial = BatchRequest::new("Cat", "Order Form", &out).with_input("B1", "Acme");
        let blank_serial = missing_serial.clone().with_input("B2", "   ");
        let zero = missing_serial.clone().with_input("B2", "S").with_quantity(0);

        for request in [missing_serial, blank_serial, zero] {
            let err = generate(&mut config, &request).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{err}");
        }

        let unknown = BatchRequest::new("Cat", "Nope", &out);
        assert!(matches!(
            generate(&mut config, &unknown).unwrap_err(),
            Error::TemplateNotFound { .. }
        ));

        assert!(!out.exists());
        assert!(config.serial_numbers.is_empty());
    }

    #[test]
    fn test_template_without_mappings() {
        let dir = TempDir::new().unwrap();
        let mut config = setup(dir.path());
        config.insert_template("Cat", "Bare", TemplateSpec::new(dir.path().join("form.xlsx")));

        let request = BatchRequest::new("Cat", "Bare", dir.path()).with_input("B2", "S");
        assert!(matches!(
            generate(&mut config, &request).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_fill_document() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());
        let output = dir.path().join("single.xlsx");

        let inputs: UserInputs = [("B1".to_string(), "Acme".to_string())].into_iter().collect();
        let result = fill_document(&config, "Cat", "Order Form", &inputs, &output).unwrap();

        assert_eq!(result.path, output);
        assert_eq!(result.written, 1);
        assert!(config.serial_numbers.is_empty());
    }
}
