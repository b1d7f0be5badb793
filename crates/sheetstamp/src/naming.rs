//! Output file names

use chrono::NaiveDateTime;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `{template}_{serial}.xlsx`.
///
/// Spaces in the template name become `_`; the serial keeps its spaces and
/// only loses path separators.
pub fn serial_file_name(template: &str, serial: &str) -> String {
    format!("{}_{}.xlsx", sanitize(template), strip_separators(serial))
}

/// `{template}_{YYYYMMDD_HHMMSS}.xlsx`
pub fn timestamped_file_name(template: &str, at: NaiveDateTime) -> String {
    format!("{}_{}.xlsx", sanitize(template), at.format(TIMESTAMP_FORMAT))
}

fn sanitize(part: &str) -> String {
    strip_separators(&part.replace(' ', "_"))
}

fn strip_separators(part: &str) -> String {
    part.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_serial_file_name() {
        assert_eq!(serial_file_name("Tmpl", "1000-1"), "Tmpl_1000-1.xlsx");
        assert_eq!(
            serial_file_name("Work Order Form", "WO 7-12"),
            "Work_Order_Form_WO 7-12.xlsx"
        );
        assert_eq!(serial_file_name("Tmpl", "WO 7-1"), "Tmpl_WO 7-1.xlsx");
        assert_eq!(serial_file_name("a/b", "..\\x"), "a_b_.._x.xlsx");
    }

    #[test]
    fn test_timestamped_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 30)
            .unwrap();
        assert_eq!(
            timestamped_file_name("Delivery Note", at),
            "Delivery_Note_20240309_070530.xlsx"
        );
    }
}
