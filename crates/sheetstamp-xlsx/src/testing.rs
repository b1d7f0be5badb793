//! Fixture workbooks built in code.
//!
//! Produces small but complete XLSX packages (content types, relationships,
//! shared strings, styles and a calculation chain when formulas are present)
//! so tests do not depend on binary files checked into the repository.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::Path;

use crate::error::XlsxResult;
use crate::reference::CellAddress;

#[derive(Debug, Clone)]
enum FixtureValue {
    Empty,
    Shared(String),
    Inline(String),
    Number(f64),
    Boolean(bool),
    Formula { formula: String, cached: String },
}

#[derive(Debug, Clone)]
struct FixtureCell {
    value: FixtureValue,
    style: Option<u32>,
}

#[derive(Debug, Clone)]
struct FixtureSheet {
    name: String,
    cells: BTreeMap<CellAddress, FixtureCell>,
}

/// Builder for fixture workbooks
///
/// ```rust,ignore
/// use sheetstamp_xlsx::testing::WorkbookBuilder;
///
/// let bytes = WorkbookBuilder::new()
///     .sheet("Form")
///     .text("A1", "Customer")
///     .number("A2", 7.0)
///     .to_bytes()
///     .unwrap();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkbookBuilder {
    sheets: Vec<FixtureSheet>,
    active: usize,
}

impl WorkbookBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new sheet; following cells go into it
    pub fn sheet(mut self, name: &str) -> Self {
        self.sheets.push(FixtureSheet {
            name: name.to_string(),
            cells: BTreeMap::new(),
        });
        self
    }

    /// Index of the sheet recorded as active in the workbook view
    pub fn active(mut self, index: usize) -> Self {
        self.active = index;
        self
    }

    /// Text stored in the shared strings table
    pub fn text(self, cell: &str, value: &str) -> Self {
        self.put(cell, FixtureValue::Shared(value.to_string()))
    }

    /// Text stored inline in the worksheet (raw, `_xHHHH_` escapes allowed)
    pub fn inline(self, cell: &str, value: &str) -> Self {
        self.put(cell, FixtureValue::Inline(value.to_string()))
    }

    pub fn number(self, cell: &str, value: f64) -> Self {
        self.put(cell, FixtureValue::Number(value))
    }

    pub fn boolean(self, cell: &str, value: bool) -> Self {
        self.put(cell, FixtureValue::Boolean(value))
    }

    /// Formula with its cached result
    pub fn formula(self, cell: &str, formula: &str, cached: &str) -> Self {
        self.put(
            cell,
            FixtureValue::Formula {
                formula: formula.to_string(),
                cached: cached.to_string(),
            },
        )
    }

    /// Apply a cell format index (0 = default, 1 = bold)
    pub fn styled(mut self, cell: &str, style: u32) -> Self {
        let address = CellAddress::parse(cell).expect("fixture cell address");
        self.current_sheet()
            .cells
            .entry(address)
            .or_insert(FixtureCell {
                value: FixtureValue::Empty,
                style: None,
            })
            .style = Some(style);
        self
    }

    fn put(mut self, cell: &str, value: FixtureValue) -> Self {
        let address = CellAddress::parse(cell).expect("fixture cell address");
        let cells = &mut self.current_sheet().cells;
        let style = cells.get(&address).and_then(|c| c.style);
        cells.insert(address, FixtureCell { value, style });
        self
    }

    fn current_sheet(&mut self) -> &mut FixtureSheet {
        if self.sheets.is_empty() {
            self.sheets.push(FixtureSheet {
                name: "Sheet1".to_string(),
                cells: BTreeMap::new(),
            });
        }
        self.sheets.last_mut().expect("at least one sheet")
    }

    /// Write the workbook to a file path
    pub fn write<P: AsRef<Path>>(&self, path: P) -> XlsxResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Serialize the workbook
    pub fn to_bytes(&self) -> XlsxResult<Vec<u8>> {
        let mut builder = self.clone();
        if builder.sheets.is_empty() {
            builder = builder.sheet("Sheet1");
        }

        let mut shared: Vec<String> = Vec::new();
        let mut formulas: Vec<(usize, CellAddress)> = Vec::new();
        let worksheets: Vec<String> = builder
            .sheets
            .iter()
            .enumerate()
            .map(|(i, sheet)| worksheet_xml(i, sheet, &mut shared, &mut formulas))
            .collect();

        let mut parts: Vec<(String, String)> = vec![
            ("[Content_Types].xml".into(), builder.content_types(!formulas.is_empty())),
            ("_rels/.rels".into(), ROOT_RELS.into()),
            ("xl/workbook.xml".into(), builder.workbook_xml()),
            ("xl/_rels/workbook.xml.rels".into(), builder.workbook_rels(!formulas.is_empty())),
            ("xl/styles.xml".into(), STYLES.into()),
            ("xl/sharedStrings.xml".into(), shared_strings_xml(&shared)),
        ];
        for (i, xml) in worksheets.into_iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml));
        }
        if !formulas.is_empty() {
            parts.push(("xl/calcChain.xml".into(), calc_chain_xml(&formulas)));
        }

        let mut cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, xml) in parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(xml.as_bytes())?;
        }
        zip.finish()?;

        Ok(cursor.into_inner())
    }

    fn content_types(&self, calc_chain: bool) -> String {
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
            r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
        ));
        for i in 0..self.sheets.len() {
            let _ = write!(
                xml,
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i + 1
            );
        }
        if calc_chain {
            xml.push_str(r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#);
        }
        xml.push_str("</Types>");
        xml
    }

    fn workbook_xml(&self) -> String {
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        ));
        let _ = write!(
            xml,
            r#"<bookViews><workbookView activeTab="{}"/></bookViews><sheets>"#,
            self.active
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            let _ = write!(
                xml,
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape_xml(&sheet.name),
                i + 1,
                i + 1
            );
        }
        xml.push_str("</sheets></workbook>");
        xml
    }

    fn workbook_rels(&self, calc_chain: bool) -> String {
        const REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        ));
        let count = self.sheets.len();
        for i in 0..count {
            let _ = write!(
                xml,
                r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                REL,
                i + 1
            );
        }
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
            count + 1,
            REL
        );
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{}/sharedStrings" Target="sharedStrings.xml"/>"#,
            count + 2,
            REL
        );
        if calc_chain {
            let _ = write!(
                xml,
                r#"<Relationship Id="rId{}" Type="{}/calcChain" Target="calcChain.xml"/>"#,
                count + 3,
                REL
            );
        }
        xml.push_str("</Relationships>");
        xml
    }
}

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"</Relationships>"#,
);

const STYLES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="1"><fill><patternFill patternType="none"/></fill></fills>"#,
    r#"<borders count="1"><border/></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs>"#,
    r#"</styleSheet>"#,
);

fn worksheet_xml(
    index: usize,
    sheet: &FixtureSheet,
    shared: &mut Vec<String>,
    formulas: &mut Vec<(usize, CellAddress)>,
) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        r#"<sheetData>"#,
    ));

    let mut current_row: Option<u32> = None;
    for (address, cell) in &sheet.cells {
        if current_row != Some(address.row) {
            if current_row.is_some() {
                xml.push_str("</row>");
            }
            let _ = write!(xml, r#"<row r="{}">"#, address.row + 1);
            current_row = Some(address.row);
        }

        let style = cell
            .style
            .map(|s| format!(r#" s="{}""#, s))
            .unwrap_or_default();
        let r = address.to_a1_string();

        let _ = match &cell.value {
            FixtureValue::Empty => write!(xml, r#"<c r="{}"{}/>"#, r, style),
            FixtureValue::Shared(text) => {
                let index = match shared.iter().position(|s| s == text) {
                    Some(i) => i,
                    None => {
                        shared.push(text.clone());
                        shared.len() - 1
                    }
                };
                write!(xml, r#"<c r="{}"{} t="s"><v>{}</v></c>"#, r, style, index)
            }
            FixtureValue::Inline(text) => write!(
                xml,
                r#"<c r="{}"{} t="inlineStr"><is><t>{}</t></is></c>"#,
                r,
                style,
                escape_xml(text)
            ),
            FixtureValue::Number(n) => write!(xml, r#"<c r="{}"{}><v>{}</v></c>"#, r, style, n),
            FixtureValue::Boolean(b) => write!(
                xml,
                r#"<c r="{}"{} t="b"><v>{}</v></c>"#,
                r,
                style,
                u8::from(*b)
            ),
            FixtureValue::Formula { formula, cached } => {
                formulas.push((index, *address));
                write!(
                    xml,
                    r#"<c r="{}"{}><f>{}</f><v>{}</v></c>"#,
                    r,
                    style,
                    escape_xml(formula),
                    escape_xml(cached)
                )
            }
        };
    }
    if current_row.is_some() {
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn shared_strings_xml(strings: &[String]) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    ));
    for s in strings {
        let _ = write!(xml, r#"<si><t xml:space="preserve">{}</t></si>"#, escape_xml(s));
    }
    xml.push_str("</sst>");
    xml
}

fn calc_chain_xml(formulas: &[(usize, CellAddress)]) -> String {
    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    ));
    for (sheet, address) in formulas {
        let _ = write!(xml, r#"<c r="{}" i="{}"/>"#, address, sheet + 1);
    }
    xml.push_str("</calcChain>");
    xml
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
