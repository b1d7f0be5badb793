//! Streaming rewrites of package XML parts

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{XlsxError, XlsxResult};
use crate::escape::encode_excel_escapes;
use crate::reference::CellAddress;

/// Staged writes for one worksheet
pub(crate) type SheetEdits = BTreeMap<CellAddress, String>;

/// Output of [`patch_worksheet`]
#[derive(Debug)]
pub(crate) struct PatchedSheet {
    pub xml: Vec<u8>,
    /// At least one overwritten cell held a formula
    pub replaced_formula: bool,
}

/// Read an attribute by its local name, unescaped
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> XlsxResult<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Row/column position while streaming `sheetData`.
///
/// The `r` attributes on `row` and `c` are optional; missing ones continue
/// from the previous element.
#[derive(Debug, Default)]
pub(crate) struct GridTracker {
    row: u32,
    next_row: u32,
    next_col: u16,
}

impl GridTracker {
    pub fn enter_row(&mut self, e: &BytesStart<'_>) -> XlsxResult<u32> {
        let row = match attr_value(e, b"r")? {
            Some(r) => match r.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n - 1,
                _ => return Err(XlsxError::InvalidFormat(format!("invalid row number '{}'", r))),
            },
            None => self.next_row,
        };
        self.row = row;
        self.next_row = row.saturating_add(1);
        self.next_col = 0;
        Ok(row)
    }

    pub fn enter_cell(&mut self, e: &BytesStart<'_>) -> XlsxResult<CellAddress> {
        let address = match attr_value(e, b"r")? {
            Some(r) => CellAddress::parse(&r)?,
            None => CellAddress::new(self.row, self.next_col),
        };
        self.next_col = address.col.saturating_add(1);
        Ok(address)
    }

    pub fn row(&self) -> u32 {
        self.row
    }
}

/// Apply staged cell writes to a worksheet part.
///
/// Cells are written as inline strings and keep the style of the cell they
/// replace (or of the row, for rows with a custom format). Everything
/// outside the touched cells passes through unchanged.
pub(crate) fn patch_worksheet(original: &[u8], edits: &SheetEdits) -> XlsxResult<PatchedSheet> {
    let mut rows: BTreeMap<u32, BTreeMap<u16, &str>> = BTreeMap::new();
    for (address, value) in edits {
        rows.entry(address.row)
            .or_default()
            .insert(address.col, value.as_str());
    }

    let mut reader = Reader::from_reader(original);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + edits.len() * 96));
    let mut buf = Vec::new();

    let mut grid = GridTracker::default();
    let mut prefix = String::new();
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;
    let mut row_cells: Option<BTreeMap<u16, &str>> = None;
    let mut row_style: Option<String> = None;
    let mut skip_depth = 0usize;
    let mut replaced_formula = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        if skip_depth > 0 {
            match event {
                Event::Start(e) => {
                    replaced_formula |= e.local_name().as_ref() == b"f";
                    skip_depth += 1;
                }
                Event::Empty(e) => replaced_formula |= e.local_name().as_ref() == b"f",
                Event::End(_) => skip_depth -= 1,
                Event::Eof => {
                    return Err(XlsxError::InvalidFormat("unterminated cell element".into()))
                }
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                prefix = element_prefix(&e);
                in_sheet_data = true;
                saw_sheet_data = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                prefix = element_prefix(&e);
                saw_sheet_data = true;
                let name = format!("{}sheetData", prefix);
                writer.write_event(Event::Start(e))?;
                write_rows(&mut writer, &prefix, std::mem::take(&mut rows))?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                in_sheet_data = false;
                write_rows(&mut writer, &prefix, std::mem::take(&mut rows))?;
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = grid.enter_row(&e)?;
                write_rows(&mut writer, &prefix, take_before(&mut rows, row))?;
                row_cells = rows.remove(&row);
                row_style = row_style_of(&e)?;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = grid.enter_row(&e)?;
                write_rows(&mut writer, &prefix, take_before(&mut rows, row))?;
                match rows.remove(&row) {
                    Some(cells) => {
                        let style = row_style_of(&e)?;
                        let name = format!("{}row", prefix);
                        writer.write_event(Event::Start(e))?;
                        write_cells(&mut writer, &prefix, row, cells, style.as_deref())?;
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some(cells) = row_cells.take() {
                    write_cells(&mut writer, &prefix, grid.row(), cells, row_style.as_deref())?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let address = grid.enter_cell(&e)?;
                if replace_cell(&mut writer, &prefix, &mut row_cells, row_style.as_deref(), address, &e)? {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let address = grid.enter_cell(&e)?;
                if !replace_cell(&mut writer, &prefix, &mut row_cells, row_style.as_deref(), address, &e)? {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    if !saw_sheet_data {
        return Err(XlsxError::InvalidFormat("worksheet has no sheetData".into()));
    }

    Ok(PatchedSheet {
        xml: writer.into_inner(),
        replaced_formula,
    })
}

/// Drop every `element` for which `matches` returns true, children included.
pub(crate) fn remove_elements<F>(original: &[u8], element: &[u8], matches: F) -> XlsxResult<Vec<u8>>
where
    F: Fn(&BytesStart<'_>) -> XlsxResult<bool>,
{
    let mut reader = Reader::from_reader(original);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == element && matches(&e)? => {
                skip_depth = 1;
            }
            Event::Empty(e) if e.local_name().as_ref() == element && matches(&e)? => {}
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Namespace prefix of an element including the colon (`x:`), or empty
fn element_prefix(e: &BytesStart<'_>) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

/// Style index new cells in this row inherit
fn row_style_of(e: &BytesStart<'_>) -> XlsxResult<Option<String>> {
    let custom = attr_value(e, b"customFormat")?;
    if matches!(custom.as_deref(), Some("1") | Some("true")) {
        attr_value(e, b"s")
    } else {
        Ok(None)
    }
}

/// Split off the rows that sort before `row`
fn take_before<V>(rows: &mut BTreeMap<u32, V>, row: u32) -> BTreeMap<u32, V> {
    let later = rows.split_off(&row);
    std::mem::replace(rows, later)
}

/// Emit pending cells left of `address`, then the replacement for `address`
/// itself if one is staged. Returns whether the original cell was replaced.
fn replace_cell(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    row_cells: &mut Option<BTreeMap<u16, &str>>,
    row_style: Option<&str>,
    address: CellAddress,
    original: &BytesStart<'_>,
) -> XlsxResult<bool> {
    let Some(cells) = row_cells.as_mut() else {
        return Ok(false);
    };

    let later = cells.split_off(&address.col);
    let earlier = std::mem::replace(cells, later);
    write_cells(writer, prefix, address.row, earlier, row_style)?;

    match cells.remove(&address.col) {
        Some(value) => {
            let style = attr_value(original, b"s")?;
            write_cell(writer, prefix, address, style.as_deref(), value)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn write_rows(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    rows: BTreeMap<u32, BTreeMap<u16, &str>>,
) -> XlsxResult<()> {
    for (row, cells) in rows {
        let name = format!("{}row", prefix);
        let number = (row + 1).to_string();
        let mut start = BytesStart::new(name.as_str());
        start.push_attribute(("r", number.as_str()));
        writer.write_event(Event::Start(start))?;
        write_cells(writer, prefix, row, cells, None)?;
        writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    }
    Ok(())
}

fn write_cells(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    row: u32,
    cells: BTreeMap<u16, &str>,
    style: Option<&str>,
) -> XlsxResult<()> {
    for (col, value) in cells {
        write_cell(writer, prefix, CellAddress::new(row, col), style, value)?;
    }
    Ok(())
}

/// `<c r=".." s=".." t="inlineStr"><is><t>value</t></is></c>`
fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    address: CellAddress,
    style: Option<&str>,
    value: &str,
) -> XlsxResult<()> {
    let c = format!("{}c", prefix);
    let is = format!("{}is", prefix);
    let t = format!("{}t", prefix);
    let reference = address.to_a1_string();

    let mut cell = BytesStart::new(c.as_str());
    cell.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        cell.push_attribute(("s", style));
    }
    cell.push_attribute(("t", "inlineStr"));

    let mut text = BytesStart::new(t.as_str());
    if value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) {
        text.push_attribute(("xml:space", "preserve"));
    }

    let encoded = encode_excel_escapes(value);
    writer.write_event(Event::Start(cell))?;
    writer.write_event(Event::Start(BytesStart::new(is.as_str())))?;
    writer.write_event(Event::Start(text))?;
    writer.write_event(Event::Text(BytesText::new(&encoded)))?;
    writer.write_event(Event::End(BytesEnd::new(t.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(is.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(c.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edits(pairs: &[(&str, &str)]) -> SheetEdits {
        pairs
            .iter()
            .map(|(cell, value)| (CellAddress::parse(cell).unwrap(), value.to_string()))
            .collect()
    }

    fn patch(xml: &str, pairs: &[(&str, &str)]) -> String {
        let patched = patch_worksheet(xml.as_bytes(), &edits(pairs)).unwrap();
        String::from_utf8(patched.xml).unwrap()
    }

    #[test]
    fn test_replaces_existing_cell_keeping_style() {
        let xml = r#"<worksheet><sheetData><row r="2"><c r="B2" s="4" t="s"><v>0</v></c></row></sheetData></worksheet>"#;
        assert_eq!(
            patch(xml, &[("B2", "Acme")]),
            r#"<worksheet><sheetData><row r="2"><c r="B2" s="4" t="inlineStr"><is><t>Acme</t></is></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_inserts_cells_in_column_order() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="B1"><v>1</v></c><c r="D1"/></row></sheetData></worksheet>"#;
        assert_eq!(
            patch(xml, &[("A1", "a"), ("C1", "c"), ("E1", "e")]),
            concat!(
                r#"<worksheet><sheetData><row r="1">"#,
                r#"<c r="A1" t="inlineStr"><is><t>a</t></is></c>"#,
                r#"<c r="B1"><v>1</v></c>"#,
                r#"<c r="C1" t="inlineStr"><is><t>c</t></is></c>"#,
                r#"<c r="D1"/>"#,
                r#"<c r="E1" t="inlineStr"><is><t>e</t></is></c>"#,
                r#"</row></sheetData></worksheet>"#
            )
        );
    }

    #[test]
    fn test_inserts_rows_in_order() {
        let xml = r#"<worksheet><sheetData><row r="2"><c r="A2"><v>1</v></c></row></sheetData></worksheet>"#;
        assert_eq!(
            patch(xml, &[("A1", "top"), ("A3", "bottom")]),
            concat!(
                r#"<worksheet><sheetData>"#,
                r#"<row r="1"><c r="A1" t="inlineStr"><is><t>top</t></is></c></row>"#,
                r#"<row r="2"><c r="A2"><v>1</v></c></row>"#,
                r#"<row r="3"><c r="A3" t="inlineStr"><is><t>bottom</t></is></c></row>"#,
                r#"</sheetData></worksheet>"#
            )
        );
    }

    #[test]
    fn test_fills_empty_sheet_data() {
        let xml = r#"<worksheet><sheetData/><pageMargins left="0.7"/></worksheet>"#;
        assert_eq!(
            patch(xml, &[("B2", "x")]),
            r#"<worksheet><sheetData><row r="2"><c r="B2" t="inlineStr"><is><t>x</t></is></c></row></sheetData><pageMargins left="0.7"/></worksheet>"#
        );
    }

    #[test]
    fn test_detects_replaced_formula() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><f>SUM(B1:B2)</f><v>3</v></c></row></sheetData></worksheet>"#;
        let patched = patch_worksheet(xml.as_bytes(), &edits(&[("A1", "fixed")])).unwrap();
        assert!(patched.replaced_formula);

        let patched = patch_worksheet(xml.as_bytes(), &edits(&[("A2", "other")])).unwrap();
        assert!(!patched.replaced_formula);
    }

    #[test]
    fn test_row_style_and_escaping() {
        let xml = r#"<worksheet><sheetData><row r="1" s="7" customFormat="1"/></sheetData></worksheet>"#;
        assert_eq!(
            patch(xml, &[("A1", " <Tom & Jerry>")]),
            r#"<worksheet><sheetData><row r="1" s="7" customFormat="1"><c r="A1" s="7" t="inlineStr"><is><t xml:space="preserve"> &lt;Tom &amp; Jerry&gt;</t></is></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_cells_without_reference_attributes() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#;
        assert_eq!(
            patch(xml, &[("B1", "two")]),
            r#"<worksheet><sheetData><row><c><v>1</v></c><c r="B1" t="inlineStr"><is><t>two</t></is></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_missing_sheet_data_is_an_error() {
        let xml = r#"<chartsheet><sheetPr/></chartsheet>"#;
        assert!(matches!(
            patch_worksheet(xml.as_bytes(), &edits(&[("A1", "x")])),
            Err(XlsxError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_remove_elements() {
        let xml = r#"<Relationships><Relationship Id="rId1" Type="a/worksheet"/><Relationship Id="rId2" Type="a/calcChain"/></Relationships>"#;
        let out = remove_elements(xml.as_bytes(), b"Relationship", |e| {
            Ok(attr_value(e, b"Type")?.map_or(false, |t| t.ends_with("/calcChain")))
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<Relationships><Relationship Id="rId1" Type="a/worksheet"/></Relationships>"#
        );
    }
}
