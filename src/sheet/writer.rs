//! Minimal XLSX writer. Produces a single-sheet workbook with every value
//! stored as an inline string, which is enough for the auto-fill commands to
//! hand a patched report back to the caller.

use crate::error::RingdocError;
use crate::error::ResultMessage;
use crate::helpers::text::escape_xml;
use crate::helpers::text::needs_space_preserve;
use crate::sheet::Table;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

const CONTENT_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELATIONSHIPS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELATIONSHIPS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Writes a table as an XLSX workbook whose single sheet carries the table's
/// name. The header row comes first, then the data rows.
pub(crate) fn write_table(path: &Path, table: &Table) -> Result<(), RingdocError> {
    let prefix = format!("Cannot write spreadsheet '{}'", path.display());
    let file = File::create(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", format!("{XML_DECLARATION}{CONTENT_TYPES}")),
        ("_rels/.rels", format!("{XML_DECLARATION}{ROOT_RELATIONSHIPS}")),
        ("xl/workbook.xml", workbook_xml(&table.name)),
        ("xl/_rels/workbook.xml.rels", format!("{XML_DECLARATION}{WORKBOOK_RELATIONSHIPS}")),
        ("xl/worksheets/sheet1.xml", sheet_xml(table)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options).map_err(RingdocError::ZipError).with_prefix(&prefix)?;
        zip.write_all(body.as_bytes()).map_err(RingdocError::IoError).with_prefix(&prefix)?;
    }
    zip.finish().map_err(RingdocError::ZipError).with_prefix(&prefix)?;
    Ok(())
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"{XML_DECLARATION}<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape_xml(sheet_name)
    )
}

fn sheet_xml(table: &Table) -> String {
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_DECLARATION);
    xml.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#);
    push_row(&mut xml, 1, &table.headers);
    for (index, row) in table.rows.iter().enumerate() {
        push_row(&mut xml, index + 2, row);
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_row(xml: &mut String, row_number: usize, fields: &[String]) {
    let _ = write!(xml, "<row r=\"{row_number}\">");
    for (index, value) in fields.iter().enumerate() {
        if value.is_empty() {
            continue;
        }
        let preserve = if needs_space_preserve(value) { " xml:space=\"preserve\"" } else { "" };
        let _ = write!(
            xml,
            "<c r=\"{}{row_number}\" t=\"inlineStr\"><is><t{preserve}>{}</t></is></c>",
            column_letters(index),
            escape_xml(value)
        );
    }
    xml.push_str("</row>");
}

/// Converts a zero-based column index into spreadsheet letters (0 = "A").
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().map(|byte| *byte as char).collect()
}
