//! Template workbook: cell lookups and staged writes over an XLSX package

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::escape::decode_excel_escapes;
use crate::package::{part_dir, rels_part_for, resolve_target, Package};
use crate::patch::{self, attr_value, GridTracker, SheetEdits};
use crate::reference::{CellAddress, CellReference};

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_WORKSHEET: &str = "/worksheet";
const REL_SHARED_STRINGS: &str = "/sharedStrings";
const REL_CALC_CHAIN: &str = "/calcChain";

/// One `Relationship` element
#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

/// A sheet as listed in `workbook.xml`
#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    /// Resolved part name, `None` if the relationship is missing
    part: Option<String>,
    /// Worksheets hold cells; chartsheets and dialog sheets do not
    is_worksheet: bool,
}

/// An XLSX workbook opened as a template.
///
/// Reads come from the package as loaded plus any staged writes. Writes are
/// kept in memory until [`TemplateWorkbook::save`], which rewrites only the
/// affected worksheet parts.
#[derive(Debug, Clone)]
pub struct TemplateWorkbook {
    package: Package,
    workbook_part: String,
    sheets: Vec<SheetEntry>,
    active: usize,
    shared_strings: Vec<String>,
    edits: BTreeMap<usize, SheetEdits>,
}

impl TemplateWorkbook {
    /// Open a workbook from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        Self::from_package(Package::open(path)?)
    }

    /// Open a workbook from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Self> {
        Self::from_package(Package::read(reader)?)
    }

    fn from_package(package: Package) -> XlsxResult<Self> {
        let workbook_part = match package.part("_rels/.rels") {
            Some(rels) => read_relationships(rels)?
                .into_iter()
                .find(|r| r.rel_type.ends_with(REL_OFFICE_DOCUMENT))
                .map(|r| resolve_target("", &r.target))
                .unwrap_or_else(|| "xl/workbook.xml".to_string()),
            None => "xl/workbook.xml".to_string(),
        };

        let base_dir = part_dir(&workbook_part).to_string();
        let rels = match package.part(&rels_part_for(&workbook_part)) {
            Some(xml) => read_relationships(xml)?,
            None => Vec::new(),
        };

        let (listed, active_tab) = read_workbook_xml(package.require(&workbook_part)?)?;
        if listed.is_empty() {
            return Err(XlsxError::InvalidFormat("workbook has no sheets".into()));
        }

        let sheets: Vec<SheetEntry> = listed
            .into_iter()
            .map(|(name, r_id)| {
                let rel = rels.iter().find(|r| r.id == r_id);
                SheetEntry {
                    name,
                    part: rel.map(|r| resolve_target(&base_dir, &r.target)),
                    is_worksheet: rel.map_or(false, |r| r.rel_type.ends_with(REL_WORKSHEET)),
                }
            })
            .collect();

        let shared_strings_part = rels
            .iter()
            .find(|r| r.rel_type.ends_with(REL_SHARED_STRINGS))
            .map(|r| resolve_target(&base_dir, &r.target));
        let shared_strings = match shared_strings_part.as_deref().and_then(|p| package.part(p)) {
            Some(xml) => read_shared_strings(xml)?,
            None => Vec::new(),
        };

        let active = if active_tab < sheets.len() { active_tab } else { 0 };

        log::debug!(
            "Opened workbook with {} sheet(s), active sheet '{}'",
            sheets.len(),
            sheets[active].name
        );

        Ok(Self {
            package,
            workbook_part,
            sheets,
            active,
            shared_strings,
            edits: BTreeMap::new(),
        })
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    /// Name of the sheet unqualified references point into
    pub fn active_sheet_name(&self) -> &str {
        &self.sheets[self.active].name
    }

    /// Index of a sheet by name; `None` means the active sheet.
    ///
    /// Exact matches win; otherwise names compare case-insensitively, as
    /// spreadsheet applications treat them.
    fn sheet_index(&self, name: Option<&str>) -> XlsxResult<usize> {
        let Some(name) = name else {
            return Ok(self.active);
        };

        self.sheets
            .iter()
            .position(|s| s.name == name)
            .or_else(|| {
                self.sheets
                    .iter()
                    .position(|s| s.name.to_lowercase() == name.to_lowercase())
            })
            .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))
    }

    /// Current value of a cell rendered as text, `None` when the cell is empty.
    ///
    /// Formula cells yield their cached result; booleans render as
    /// `TRUE`/`FALSE`; numbers keep the text stored in the file.
    pub fn cell_value(&self, reference: &CellReference) -> XlsxResult<Option<String>> {
        let index = self.sheet_index(reference.sheet.as_deref())?;

        if let Some(staged) = self
            .edits
            .get(&index)
            .and_then(|edits| edits.get(&reference.address))
        {
            return Ok(Some(staged.clone()));
        }

        let sheet = &self.sheets[index];
        let part = sheet
            .part
            .as_deref()
            .ok_or_else(|| XlsxError::MissingPart(format!("sheet '{}'", sheet.name)))?;

        find_cell(self.package.require(part)?, reference.address, &self.shared_strings)
    }

    /// Stage a text value for a cell; applied on save.
    pub fn set_cell_value(&mut self, reference: &CellReference, value: &str) -> XlsxResult<()> {
        let index = self.sheet_index(reference.sheet.as_deref())?;

        let sheet = &self.sheets[index];
        if !sheet.is_worksheet || sheet.part.is_none() {
            return Err(XlsxError::InvalidFormat(format!(
                "'{}' is not a worksheet",
                sheet.name
            )));
        }

        self.edits
            .entry(index)
            .or_default()
            .insert(reference.address, value.to_string());
        Ok(())
    }

    /// Number of staged cell writes
    pub fn pending_writes(&self) -> usize {
        self.edits.values().map(|e| e.len()).sum()
    }

    /// Write the workbook, with staged values applied, to a file path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> XlsxResult<()> {
        self.patched_package()?.save(path)
    }

    /// Write the workbook, with staged values applied, to a writer
    pub fn write<W: Write + Seek>(&self, writer: W) -> XlsxResult<()> {
        self.patched_package()?.write(writer)
    }

    fn patched_package(&self) -> XlsxResult<Package> {
        let mut package = self.package.clone();
        let mut replaced_formula = false;

        for (&index, edits) in self.edits.iter().filter(|(_, e)| !e.is_empty()) {
            let sheet = &self.sheets[index];
            let Some(part) = sheet.part.as_deref() else {
                continue;
            };

            let patched = patch::patch_worksheet(package.require(part)?, edits)?;
            log::debug!("Patched {} cell(s) in sheet '{}'", edits.len(), sheet.name);

            replaced_formula |= patched.replaced_formula;
            package.set_part(part, patched.xml);
        }

        if replaced_formula {
            self.drop_calc_chain(&mut package)?;
        }

        Ok(package)
    }

    /// Remove the calculation chain part and every reference to it.
    ///
    /// The chain lists formula cells; once one of them holds a plain value
    /// spreadsheet applications treat the stale chain as corruption. It is
    /// rebuilt on the next recalculation.
    fn drop_calc_chain(&self, package: &mut Package) -> XlsxResult<()> {
        let rels_part = rels_part_for(&self.workbook_part);
        let Some(rels_xml) = package.part(&rels_part) else {
            return Ok(());
        };

        let Some(chain) = read_relationships(rels_xml)?
            .into_iter()
            .find(|r| r.rel_type.ends_with(REL_CALC_CHAIN))
        else {
            return Ok(());
        };

        let chain_part = resolve_target(part_dir(&self.workbook_part), &chain.target);
        log::debug!("Dropping calculation chain '{}'", chain_part);

        let rels = patch::remove_elements(rels_xml, b"Relationship", |e| {
            Ok(attr_value(e, b"Id")?.as_deref() == Some(chain.id.as_str()))
        })?;
        package.set_part(&rels_part, rels);
        package.remove_part(&chain_part);

        if let Some(types) = package.part("[Content_Types].xml") {
            let part_name = format!("/{}", chain_part);
            let types = patch::remove_elements(types, b"Override", |e| {
                Ok(attr_value(e, b"PartName")?.as_deref() == Some(part_name.as_str()))
            })?;
            package.set_part("[Content_Types].xml", types);
        }

        Ok(())
    }
}

/// Parse a `.rels` part
fn read_relationships(xml: &[u8]) -> XlsxResult<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                let rel_type = attr_value(&e, b"Type")?;
                let target = attr_value(&e, b"Target")?;

                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Read workbook.xml: sheet names with their rIds, and the active tab
fn read_workbook_xml(xml: &[u8]) -> XlsxResult<(Vec<(String, String)>, usize)> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut active_tab = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = None;
                    let mut r_id = None;

                    for attr in e.attributes().flatten() {
                        let key = attr.key;
                        match (key.prefix().is_some(), key.local_name().as_ref()) {
                            (false, b"name") => name = Some(attr.unescape_value()?.into_owned()),
                            (true, b"id") => r_id = Some(attr.unescape_value()?.into_owned()),
                            _ => {}
                        }
                    }

                    if let (Some(name), Some(r_id)) = (name, r_id) {
                        sheets.push((name, r_id));
                    }
                }
                b"workbookView" => {
                    if let Some(tab) = attr_value(&e, b"activeTab")? {
                        active_tab = tab.trim().parse().unwrap_or(0);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, active_tab))
}

/// Read the shared strings table; rich-text runs are concatenated and
/// phonetic hints dropped.
fn read_shared_strings(xml: &[u8]) -> XlsxResult<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if !in_si && e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(decode_excel_escapes(&current));
                    current.clear();
                    in_si = false;
                }
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Text(e) if in_t && !in_phonetic => {
                current.push_str(&e.unescape()?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Locate one cell in a worksheet part and render its value
fn find_cell(xml: &[u8], target: CellAddress, shared_strings: &[String]) -> XlsxResult<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut grid = GridTracker::default();
    let mut in_sheet_data = false;

    let mut in_target = false;
    let mut cell_type: Option<String> = None;
    let mut value: Option<String> = None;
    let mut inline: Option<String> = None;
    let mut in_v = false;
    let mut in_is = false;
    let mut in_t = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = true,
                b"row" if in_sheet_data => {
                    if grid.enter_row(&e)? > target.row {
                        return Ok(None);
                    }
                }
                b"c" if in_sheet_data => {
                    if grid.enter_cell(&e)? == target {
                        in_target = true;
                        cell_type = attr_value(&e, b"t")?;
                    }
                }
                b"v" if in_target => in_v = true,
                b"is" if in_target => {
                    in_is = true;
                    inline = Some(String::new());
                }
                b"t" if in_is => in_t = true,
                b"rPh" if in_is => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" if in_sheet_data => {
                    if grid.enter_row(&e)? > target.row {
                        return Ok(None);
                    }
                }
                b"c" if in_sheet_data => {
                    if grid.enter_cell(&e)? == target {
                        return Ok(None);
                    }
                }
                _ => {}
            },
            Event::Text(e) if in_v => {
                value.get_or_insert_with(String::new).push_str(&e.unescape()?);
            }
            Event::Text(e) if in_t && !in_phonetic => {
                if let Some(text) = inline.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"c" if in_target => {
                    return render_cell(cell_type.as_deref(), value, inline, shared_strings);
                }
                b"v" => in_v = false,
                b"is" => in_is = false,
                b"t" => in_t = false,
                b"rPh" => in_phonetic = false,
                b"sheetData" => return Ok(None),
                _ => {}
            },
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn render_cell(
    cell_type: Option<&str>,
    value: Option<String>,
    inline: Option<String>,
    shared_strings: &[String],
) -> XlsxResult<Option<String>> {
    let rendered = match cell_type {
        Some("s") => match value {
            Some(raw) => {
                let index: usize = raw.trim().parse().map_err(|_| {
                    XlsxError::InvalidFormat(format!("invalid shared string index '{}'", raw))
                })?;
                let text = shared_strings.get(index).ok_or_else(|| {
                    XlsxError::InvalidFormat(format!("shared string {} out of range", index))
                })?;
                Some(text.clone())
            }
            None => None,
        },
        Some("inlineStr") => inline.map(|s| decode_excel_escapes(&s)),
        Some("b") => value.map(|v| if v.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        Some("str") => value.map(|v| decode_excel_escapes(&v)),
        _ => value,
    };

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorkbookBuilder;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn open(builder: &WorkbookBuilder) -> TemplateWorkbook {
        TemplateWorkbook::read(Cursor::new(builder.to_bytes().unwrap())).unwrap()
    }

    fn value(workbook: &TemplateWorkbook, reference: &str) -> Option<String> {
        workbook
            .cell_value(&CellReference::parse(reference).unwrap())
            .unwrap()
    }

    #[test]
    fn test_reads_typed_values() {
        let workbook = open(
            &WorkbookBuilder::new()
                .sheet("Form")
                .text("A1", "Company name")
                .number("A2", 42.0)
                .number("A3", 2.5)
                .boolean("A4", true)
                .formula("A5", "A2*2", "84")
                .inline("A6", "Line_x000a_two"),
        );

        assert_eq!(value(&workbook, "A1").as_deref(), Some("Company name"));
        assert_eq!(value(&workbook, "A2").as_deref(), Some("42"));
        assert_eq!(value(&workbook, "A3").as_deref(), Some("2.5"));
        assert_eq!(value(&workbook, "A4").as_deref(), Some("TRUE"));
        assert_eq!(value(&workbook, "A5").as_deref(), Some("84"));
        assert_eq!(value(&workbook, "A6").as_deref(), Some("Line\ntwo"));
        assert_eq!(value(&workbook, "B1"), None);
        assert_eq!(value(&workbook, "Z99"), None);
    }

    #[test]
    fn test_active_sheet_and_named_sheets() {
        let workbook = open(
            &WorkbookBuilder::new()
                .sheet("First")
                .text("A1", "from first")
                .sheet("Second")
                .text("A1", "from second")
                .active(1),
        );

        assert_eq!(workbook.active_sheet_name(), "Second");
        assert_eq!(
            workbook.sheet_names().collect::<Vec<_>>(),
            vec!["First", "Second"]
        );
        assert_eq!(value(&workbook, "A1").as_deref(), Some("from second"));
        assert_eq!(value(&workbook, "First!A1").as_deref(), Some("from first"));
        assert_eq!(value(&workbook, "first!A1").as_deref(), Some("from first"));

        let err = workbook
            .cell_value(&CellReference::parse("Missing!A1").unwrap())
            .unwrap_err();
        assert!(matches!(err, XlsxError::SheetNotFound(name) if name == "Missing"));
    }

    #[test]
    fn test_staged_writes_are_visible_and_saved() {
        let mut workbook = open(
            &WorkbookBuilder::new()
                .sheet("Form")
                .text("A1", "Client")
                .text("B1", "placeholder")
                .styled("B1", 1),
        );

        let b1 = CellReference::parse("B1").unwrap();
        workbook.set_cell_value(&b1, "Acme & Sons").unwrap();
        workbook
            .set_cell_value(&CellReference::parse("Form!C10").unwrap(), "new")
            .unwrap();
        assert_eq!(workbook.pending_writes(), 2);
        assert_eq!(value(&workbook, "B1").as_deref(), Some("Acme & Sons"));

        let mut out = Cursor::new(Vec::new());
        workbook.write(&mut out).unwrap();

        let reopened = TemplateWorkbook::read(Cursor::new(out.into_inner())).unwrap();
        assert_eq!(reopened.pending_writes(), 0);
        assert_eq!(value(&reopened, "A1").as_deref(), Some("Client"));
        assert_eq!(value(&reopened, "B1").as_deref(), Some("Acme & Sons"));
        assert_eq!(value(&reopened, "C10").as_deref(), Some("new"));

        let sheet_xml =
            String::from_utf8(reopened.package.part("xl/worksheets/sheet1.xml").unwrap().to_vec())
                .unwrap();
        assert!(sheet_xml.contains(r#"<c r="B1" s="1" t="inlineStr">"#));
    }

    #[test]
    fn test_overwriting_formula_drops_calc_chain() {
        let mut workbook = open(
            &WorkbookBuilder::new()
                .sheet("Calc")
                .number("A1", 1.0)
                .formula("A2", "A1+1", "2"),
        );
        assert!(workbook.package.contains("xl/calcChain.xml"));

        workbook
            .set_cell_value(&CellReference::parse("A2").unwrap(), "fixed")
            .unwrap();
        let mut out = Cursor::new(Vec::new());
        workbook.write(&mut out).unwrap();

        let package = Package::read(Cursor::new(out.into_inner())).unwrap();
        assert!(!package.contains("xl/calcChain.xml"));
        let rels = String::from_utf8_lossy(package.part("xl/_rels/workbook.xml.rels").unwrap())
            .into_owned();
        assert!(!rels.contains("calcChain"));
        let types = String::from_utf8_lossy(package.part("[Content_Types].xml").unwrap())
            .into_owned();
        assert!(!types.contains("calcChain"));
    }

    #[test]
    fn test_untouched_parts_are_byte_identical() {
        let builder = WorkbookBuilder::new()
            .sheet("One")
            .text("A1", "keep")
            .sheet("Two")
            .text("A1", "edit");
        let original = Package::read(Cursor::new(builder.to_bytes().unwrap())).unwrap();

        let mut workbook = open(&builder);
        workbook
            .set_cell_value(&CellReference::parse("Two!A1").unwrap(), "edited")
            .unwrap();
        let mut out = Cursor::new(Vec::new());
        workbook.write(&mut out).unwrap();
        let saved = Package::read(Cursor::new(out.into_inner())).unwrap();

        for name in original.part_names() {
            if name == "xl/worksheets/sheet2.xml" {
                assert_ne!(original.part(name), saved.part(name));
            } else {
                assert_eq!(original.part(name), saved.part(name), "part {} changed", name);
            }
        }
    }

    #[test]
    fn test_shared_strings_rich_text() {
        let xml = br#"<sst><si><t>plain</t></si><si><r><t>ri</t></r><r><rPr/><t xml:space="preserve">ch </t></r><rPh><t>ignored</t></rPh></si><si/></sst>"#;
        assert_eq!(
            read_shared_strings(xml).unwrap(),
            vec!["plain".to_string(), "rich ".to_string(), String::new()]
        );
    }
}
