//! Cell address and sheet-qualified reference types

use crate::error::{XlsxError, XlsxResult};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A cell address (e.g., "A1", "$B$2")
///
/// Rows and columns are stored 0-based. `$` markers are accepted when parsing
/// but not kept, since a template coordinate always names one fixed cell.
/// Ordering is row-major, which is the order cells appear in worksheet XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    /// Row index (0-based internally, 1-based in display)
    pub row: u32,
    /// Column index (0-based, A=0, B=1, ..., XFD=16383)
    pub col: u16,
}

impl CellAddress {
    /// Create a new cell address from 0-based indices
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Parse a cell address from A1-style notation
    ///
    /// # Examples
    /// ```
    /// use sheetstamp_xlsx::CellAddress;
    ///
    /// let addr = CellAddress::parse("B3").unwrap();
    /// assert_eq!(addr.row, 2);
    /// assert_eq!(addr.col, 1);
    ///
    /// let addr = CellAddress::parse("$C$10").unwrap();
    /// assert_eq!(addr.to_a1_string(), "C10");
    /// ```
    pub fn parse(s: &str) -> XlsxResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(XlsxError::InvalidReference("empty address".into()));
        }

        let bytes = s.as_bytes();
        let mut pos = 0;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }

        if pos == col_start {
            return Err(XlsxError::InvalidReference(format!(
                "no column letters in '{}'",
                s
            )));
        }

        let col = Self::letters_to_column(&s[col_start..pos])?;

        if bytes.get(pos) == Some(&b'$') {
            pos += 1;
        }

        let row_str = &s[pos..];
        if row_str.is_empty() {
            return Err(XlsxError::InvalidReference(format!(
                "no row number in '{}'",
                s
            )));
        }

        let row: u32 = row_str
            .parse()
            .map_err(|_| XlsxError::InvalidReference(format!("invalid row number in '{}'", s)))?;

        if row == 0 || row > MAX_ROWS {
            return Err(XlsxError::InvalidReference(format!(
                "row number out of range in '{}'",
                s
            )));
        }

        Ok(Self { row: row - 1, col })
    }

    /// Convert column index to letters (0 = A, 25 = Z, 26 = AA, etc.)
    pub fn column_to_letters(col: u16) -> String {
        let mut result = String::new();
        let mut n = col as u32 + 1;

        while n > 0 {
            n -= 1;
            result.insert(0, ((n % 26) as u8 + b'A') as char);
            n /= 26;
        }

        result
    }

    /// Convert column letters to index (A = 0, Z = 25, AA = 26, etc.)
    pub fn letters_to_column(letters: &str) -> XlsxResult<u16> {
        if letters.is_empty() {
            return Err(XlsxError::InvalidReference("empty column letters".into()));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(XlsxError::InvalidReference(format!(
                    "invalid column letter '{}'",
                    c
                )));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > MAX_COLS as u32 {
                return Err(XlsxError::InvalidReference(format!(
                    "column '{}' out of range",
                    letters
                )));
            }
        }

        Ok((col - 1) as u16)
    }

    /// Format as A1-style string
    pub fn to_a1_string(&self) -> String {
        format!("{}{}", Self::column_to_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = XlsxError;

    fn from_str(s: &str) -> XlsxResult<Self> {
        Self::parse(s)
    }
}

/// A cell address optionally qualified by a sheet name (`Sheet2!B4`)
///
/// Without a sheet the reference points into the workbook's active sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellReference {
    /// Sheet name, `None` for the active sheet
    pub sheet: Option<String>,
    /// Cell within the sheet
    pub address: CellAddress,
}

impl CellReference {
    /// Create a reference into the active sheet
    pub fn active(address: CellAddress) -> Self {
        Self {
            sheet: None,
            address,
        }
    }

    /// Create a reference into a named sheet
    pub fn on_sheet<S: Into<String>>(sheet: S, address: CellAddress) -> Self {
        Self {
            sheet: Some(sheet.into()),
            address,
        }
    }

    /// Parse `[Sheet!]A1`; quoted sheet names (`'Q1 Data'!B2`) are unquoted.
    ///
    /// # Examples
    /// ```
    /// use sheetstamp_xlsx::CellReference;
    ///
    /// let r = CellReference::parse("Totals!C7").unwrap();
    /// assert_eq!(r.sheet.as_deref(), Some("Totals"));
    ///
    /// let r = CellReference::parse("'It''s here'!A1").unwrap();
    /// assert_eq!(r.sheet.as_deref(), Some("It's here"));
    ///
    /// let r = CellReference::parse("B2").unwrap();
    /// assert!(r.sheet.is_none());
    /// ```
    pub fn parse(s: &str) -> XlsxResult<Self> {
        let s = s.trim();

        let (sheet, address) = if let Some(quoted) = s.strip_prefix('\'') {
            Self::split_quoted(quoted)
                .ok_or_else(|| XlsxError::InvalidReference(format!("unterminated quote in '{}'", s)))?
        } else {
            match s.split_once('!') {
                Some((sheet, address)) => (sheet.to_string(), address),
                None => return Ok(Self::active(CellAddress::parse(s)?)),
            }
        };

        if sheet.is_empty() {
            return Err(XlsxError::InvalidReference(format!(
                "empty sheet name in '{}'",
                s
            )));
        }

        Ok(Self::on_sheet(sheet, CellAddress::parse(address)?))
    }

    /// Split `It''s here'!A1` (opening quote already stripped) into the
    /// unescaped sheet name and the text after `!`.
    fn split_quoted(s: &str) -> Option<(String, &str)> {
        let mut sheet = String::new();
        let mut chars = s.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if c != '\'' {
                sheet.push(c);
                continue;
            }
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                sheet.push('\'');
                continue;
            }
            return s[i + 1..].strip_prefix('!').map(|rest| (sheet, rest));
        }

        None
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            None => write!(f, "{}", self.address),
            Some(sheet)
                if sheet
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                write!(f, "{}!{}", sheet, self.address)
            }
            Some(sheet) => write!(f, "'{}'!{}", sheet.replace('\'', "''"), self.address),
        }
    }
}

impl FromStr for CellReference {
    type Err = XlsxError;

    fn from_str(s: &str) -> XlsxResult<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(CellAddress::column_to_letters(0), "A");
        assert_eq!(CellAddress::column_to_letters(25), "Z");
        assert_eq!(CellAddress::column_to_letters(26), "AA");
        assert_eq!(CellAddress::column_to_letters(16383), "XFD");

        assert_eq!(CellAddress::letters_to_column("A").unwrap(), 0);
        assert_eq!(CellAddress::letters_to_column("ab").unwrap(), 27);
        assert_eq!(CellAddress::letters_to_column("XFD").unwrap(), 16383);
        assert!(CellAddress::letters_to_column("XFE").is_err());
    }

    #[test]
    fn test_address_parse() {
        assert_eq!(CellAddress::parse("A1").unwrap(), CellAddress::new(0, 0));
        assert_eq!(CellAddress::parse("b2").unwrap(), CellAddress::new(1, 1));
        assert_eq!(CellAddress::parse("$D$12").unwrap(), CellAddress::new(11, 3));
        assert_eq!(
            CellAddress::parse("XFD1048576").unwrap(),
            CellAddress::new(1_048_575, 16383)
        );
    }

    #[test]
    fn test_address_parse_errors() {
        assert!(CellAddress::parse("").is_err());
        assert!(CellAddress::parse("A").is_err());
        assert!(CellAddress::parse("12").is_err());
        assert!(CellAddress::parse("A0").is_err());
        assert!(CellAddress::parse("A1048577").is_err());
        assert!(CellAddress::parse("A1B").is_err());
    }

    #[test]
    fn test_address_ordering_is_row_major() {
        let mut cells = vec![
            CellAddress::parse("B1").unwrap(),
            CellAddress::parse("A2").unwrap(),
            CellAddress::parse("A1").unwrap(),
        ];
        cells.sort();
        let names: Vec<_> = cells.iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["A1", "B1", "A2"]);
    }

    #[test]
    fn test_reference_parse() {
        let r = CellReference::parse("Sheet2!B4").unwrap();
        assert_eq!(r.sheet.as_deref(), Some("Sheet2"));
        assert_eq!(r.address, CellAddress::new(3, 1));

        let r = CellReference::parse("'Q1 Data'!$A$1").unwrap();
        assert_eq!(r.sheet.as_deref(), Some("Q1 Data"));
        assert_eq!(r.address, CellAddress::new(0, 0));

        assert!(CellReference::parse("!A1").is_err());
        assert!(CellReference::parse("Sheet1!").is_err());
        assert!(CellReference::parse("Sheet1!A1!B2").is_err());
        assert!(CellReference::parse("'Open!A1").is_err());
    }

    #[test]
    fn test_reference_display() {
        assert_eq!(CellReference::parse("c3").unwrap().to_string(), "C3");
        assert_eq!(
            CellReference::parse("Data!A1").unwrap().to_string(),
            "Data!A1"
        );
        assert_eq!(
            CellReference::parse("'It''s'!A1").unwrap().to_string(),
            "'It''s'!A1"
        );
    }
}
