//! XLSX reader. Walks the OOXML package directly: workbook relationships give
//! the sheet part paths, shared strings and style number formats are loaded up
//! front, then each sheet part streams row by row into a string grid.

use crate::error::RingdocError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::sheet::cell::Cell;
use crate::sheet::cell::CellType;
use crate::sheet::SheetError;
use crate::sheet::Table;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::mem::take;
use zip::ZipArchive;

// XML tag names for parsing the XLSX format
const TAG_RELATIONSHIP: QName = QName(b"Relationship");
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

/// An opened XLSX workbook.
pub(crate) struct Workbook {
    /// File name of the workbook, kept for error messages
    pub(crate) name: String,
    /// ZIP archive holding the package parts
    zip: ZipArchive<BufReader<File>>,
    /// Cell types resolved per style index
    number_formats: Vec<CellType>,
    /// Fully loaded shared string table
    shared_strings: Vec<String>,
    /// Worksheets as (name, zip_path) pairs in workbook order
    sheets: Vec<(String, String)>,
}

impl Workbook {
    /// Opens an XLSX file and loads its structure: sheet list, date system,
    /// number formats, and the shared string table.
    pub(crate) fn open(file_name: &str) -> Result<Workbook, RingdocError> {
        let prefix = format!("Cannot read spreadsheet '{file_name}'");
        let file = File::open(file_name).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(RingdocError::ZipError).with_prefix(&prefix)?;

        let (sheets, is_1904) = load_workbook(&mut zip, file_name)?;
        if sheets.is_empty() {
            Err(SheetError::WorkbookEmptyError(file_name.to_owned()))?
        }

        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        Ok(Workbook {
            name: file_name.to_owned(),
            zip,
            number_formats,
            shared_strings,
            sheets,
        })
    }

    /// Names of the worksheets in workbook order.
    pub(crate) fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Reads a sheet as a header row plus data rows, all values coerced to text.
    pub(crate) fn read_table(&mut self, sheet_name: &str) -> Result<Table, RingdocError> {
        let mut grid = self.read_grid(sheet_name)?;
        if grid.is_empty() {
            return Ok(Table::new(sheet_name, Vec::new(), Vec::new()));
        }
        let headers = grid.remove(0);
        Ok(Table::new(sheet_name, headers, grid))
    }

    /// Reads a sheet as a raw grid without header interpretation. Rows and
    /// columns keep their sheet positions; gaps come back as empty strings.
    pub(crate) fn read_grid(&mut self, sheet_name: &str) -> Result<Vec<Vec<String>>, RingdocError> {
        let zip_path = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, path)| path.to_owned())
            .ok_or_else(|| {
                let available = self
                    .sheets
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                SheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned(), available)
            })?;

        let mut grid: Vec<Vec<String>> = Vec::new();
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut reader = self
            .zip
            .xml_reader(&zip_path)?
            .ok_or_else(|| SheetError::MissingPartError(self.name.to_owned(), zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count += 1;
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if kind == CellType::Number {
                    if let Some(index) = event.parse_attribute_value::<usize>("s")? {
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
                value.clear();
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    // Shared strings resolve through the table; everything else
                    // renders through the cell's own text coercion.
                    let text = if kind == CellType::SharedString {
                        value.parse::<usize>().ok()
                            .and_then(|index| self.shared_strings.get(index))
                            .map(String::to_owned)
                            .unwrap_or_default()
                    } else {
                        Cell { kind, value: take(&mut value) }.to_string()
                    };
                    if !text.is_empty() {
                        while grid.len() <= row {
                            grid.push(Vec::new());
                        }
                        let fields = &mut grid[row];
                        if fields.len() <= col {
                            fields.resize(col + 1, String::new());
                        }
                        fields[col] = text;
                    }
                }
                kind = CellType::default();
            }
        });
        Ok(grid)
    }
}

/// Loads worksheet names and their part paths plus the workbook date system.
fn load_workbook(zip: &mut ZipArchive<BufReader<File>>, file_name: &str) -> Result<(Vec<(String, String)>, bool), RingdocError> {
    let relationships = load_relationships(zip, file_name, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SheetError::MissingPartError(file_name.to_owned(), "xl/workbook.xml".to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id.to_string()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads worksheet relationships, mapping relationship IDs to part paths.
fn load_relationships(zip: &mut ZipArchive<BufReader<File>>, file_name: &str, path: &str) -> Result<HashMap<String, String>, RingdocError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SheetError::MissingPartError(file_name.to_owned(), path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP.as_ref() => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only worksheet relationships matter here
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a relationship target into a path inside the package.
fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix("/xl/") {
        format!("xl/{stripped}")
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Loads style number formats from styles.xml and resolves each format index
/// to a cell type (custom formats first, then built-in IDs).
fn load_number_formats(zip: &mut ZipArchive<BufReader<File>>, is_1904: bool) -> Result<Vec<CellType>, RingdocError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if !custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = true;
        }
        Event::End(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = false;
        }
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if !format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = true;
        }
        Event::End(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = false;
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            if let Some(id) = event.get_attribute_value("numFmtId")? {
                format_indexes.push(id.to_string());
            }
        }
    });

    let number_formats = format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect();
    Ok(number_formats)
}

/// Loads the shared string table; absent table means no shared strings are used.
fn load_shared_strings(zip: &mut ZipArchive<BufReader<File>>) -> Result<Vec<String>, RingdocError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Reads string content up to `end_tag`, skipping phonetic annotations and
/// handling text, CDATA, and entity references.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, RingdocError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

/// Parses an "A1"-style cell reference into zero-based (row, column) indexes.
fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let mut row = 0usize;
    let mut col = 0usize;
    let mut has_row = false;
    let mut has_col = false;
    for character in reference.chars() {
        if character.is_ascii_alphabetic() {
            if has_row {
                return None;
            }
            col = col * 26 + (character.to_ascii_uppercase() as usize - 'A' as usize + 1);
            has_col = true;
        } else if character.is_ascii_digit() {
            row = row * 10 + (character as usize - '0' as usize);
            has_row = true;
        } else {
            return None;
        }
    }
    if has_col && has_row && row > 0 && col > 0 {
        Some((row - 1, col - 1))
    } else {
        None
    }
}
