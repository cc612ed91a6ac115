//! Data table materialization. The first table whose header row satisfies the
//! matcher keeps its header and has every body row replaced by generated rows,
//! then the table and header cells are switched to automatic widths so the
//! result lays itself out.

use crate::docx::package::Package;
use crate::docx::package::DOCUMENT_PART;
use crate::docx::text::apply_patch;
use crate::docx::text::find_element;
use crate::docx::text::run_text_events;
use crate::docx::text::text_between;
use crate::docx::text::Patch;
use crate::error::RingdocError;
use crate::helpers::text::blank_if_nan;
use crate::helpers::text::needs_space_preserve;
use crate::helpers::xml::read_events;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::name::QName;

const TAG_TABLE: QName = QName(b"w:tbl");
const TAG_TABLE_PROPERTIES: QName = QName(b"w:tblPr");
const TAG_TABLE_WIDTH: QName = QName(b"w:tblW");
const TAG_TABLE_LAYOUT: QName = QName(b"w:tblLayout");
const TAG_GRID_COLUMN: QName = QName(b"w:gridCol");
const TAG_ROW: QName = QName(b"w:tr");
const TAG_CELL: QName = QName(b"w:tc");
const TAG_CELL_PROPERTIES: QName = QName(b"w:tcPr");
const TAG_CELL_WIDTH: QName = QName(b"w:tcW");

/// One top-level table: its extent, header row, and column layout.
struct TableShape {
    start: usize,
    end: usize,
    header_end: usize,
    header_cells: Vec<(usize, usize)>,
    grid_columns: usize,
}

/// Fills the first table whose header row matches with the given rows. Only
/// top-level tables are candidates; a table nested inside another table's
/// cell is never matched. Each row holds the mapped cell values in order;
/// when the table is wider than the mapping the first column receives the
/// row's 1-based position, and when it is narrower the extra values are
/// dropped. Returns whether a table matched.
pub(crate) fn materialize(
    package: &mut Package,
    matcher: impl Fn(&str) -> bool,
    rows: &[Vec<String>],
) -> Result<bool, RingdocError> {
    let bytes = match package.part(DOCUMENT_PART) {
        Some(bytes) => bytes,
        None => return Ok(false),
    };
    let events = read_events(bytes)?;

    let mut target = None;
    for shape in top_level_tables(&events) {
        let mut header_texts = Vec::with_capacity(shape.header_cells.len());
        for (start, end) in &shape.header_cells {
            header_texts.push(text_between(&events, *start, *end)?);
        }
        if matcher(&header_texts.join(" ")) {
            target = Some(shape);
            break;
        }
    }
    let shape = match target {
        Some(shape) => shape,
        None => return Ok(false),
    };

    let mut patch = Patch::default();
    reset_widths(&events, &shape, &mut patch);

    // Everything between the header row and the end of the table goes away
    for index in shape.header_end + 1..shape.end {
        patch.dropped.insert(index);
    }

    let columns = if shape.grid_columns > 0 {
        shape.grid_columns
    } else {
        shape.header_cells.len()
    };
    let mut generated = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        push_row(&mut generated, columns, index, row);
    }
    patch.inserted_after.insert(shape.header_end, generated);

    let bytes = apply_patch(&events, &patch)?;
    package.set_part(DOCUMENT_PART, bytes);
    Ok(true)
}

/// Scans the part for top-level tables and their header rows. Tables nested
/// inside cells are ignored, as are tables without a row.
fn top_level_tables(events: &[Event]) -> Vec<TableShape> {
    struct Raw {
        start: usize,
        header_open: Option<usize>,
        header: Option<(usize, usize)>,
        header_cells: Vec<(usize, usize)>,
        cell_open: Option<usize>,
        grid_columns: usize,
        rows_seen: usize,
    }

    let mut tables = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<Raw> = None;
    for (index, event) in events.iter().enumerate() {
        match event {
            Event::Start(element) if element.name() == TAG_TABLE => {
                depth += 1;
                if depth == 1 {
                    current = Some(Raw {
                        start: index,
                        header_open: None,
                        header: None,
                        header_cells: Vec::new(),
                        cell_open: None,
                        grid_columns: 0,
                        rows_seen: 0,
                    });
                }
            }
            Event::End(element) if element.name() == TAG_TABLE => {
                if depth == 1 {
                    if let Some(raw) = current.take() {
                        if let Some((_, header_end)) = raw.header {
                            tables.push(TableShape {
                                start: raw.start,
                                end: index,
                                header_end,
                                header_cells: raw.header_cells,
                                grid_columns: raw.grid_columns,
                            });
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            _ if depth == 1 => {
                if let Some(raw) = current.as_mut() {
                    match event {
                        Event::Start(element) if element.name() == TAG_GRID_COLUMN && raw.rows_seen == 0 => {
                            raw.grid_columns += 1;
                        }
                        Event::Start(element) if element.name() == TAG_ROW => {
                            raw.rows_seen += 1;
                            if raw.rows_seen == 1 {
                                raw.header_open = Some(index);
                            }
                        }
                        Event::End(element) if element.name() == TAG_ROW => {
                            if let Some(open) = raw.header_open.take() {
                                raw.header = Some((open, index));
                            }
                        }
                        Event::Start(element) if element.name() == TAG_CELL && raw.header_open.is_some() => {
                            raw.cell_open = Some(index);
                        }
                        Event::End(element) if element.name() == TAG_CELL && raw.header_open.is_some() => {
                            if let Some(open) = raw.cell_open.take() {
                                raw.header_cells.push((open, index));
                            }
                        }
                        _ => (),
                    }
                }
            }
            _ => (),
        }
    }
    tables
}

/// Switches the table and its header cells to automatic widths.
fn reset_widths(events: &[Event], shape: &TableShape, patch: &mut Patch) {
    let header_start = shape
        .header_cells
        .first()
        .map(|(start, _)| *start)
        .unwrap_or(shape.header_end);
    match find_element(events, shape.start + 1, header_start, TAG_TABLE_PROPERTIES) {
        Some((start, end)) => {
            if !replace_leaf(events, start, end, TAG_TABLE_WIDTH, Event::Empty(auto_width("w:tblW")), patch) {
                patch.inserted_after.insert(start, vec![Event::Empty(auto_width("w:tblW"))]);
            }
            replace_leaf(events, start, end, TAG_TABLE_LAYOUT, Event::Empty(autofit_layout()), patch);
        }
        None => {
            patch.inserted_after.insert(
                shape.start,
                vec![
                    Event::Start(BytesStart::new("w:tblPr")),
                    Event::Empty(auto_width("w:tblW")),
                    Event::End(BytesEnd::new("w:tblPr")),
                ],
            );
        }
    }

    for (cell_start, cell_end) in &shape.header_cells {
        match find_element(events, cell_start + 1, *cell_end, TAG_CELL_PROPERTIES) {
            Some((start, end)) => {
                if !replace_leaf(events, start, end, TAG_CELL_WIDTH, Event::Empty(auto_width("w:tcW")), patch) {
                    patch.inserted_after.insert(start, vec![Event::Empty(auto_width("w:tcW"))]);
                }
            }
            None => {
                patch.inserted_after.insert(
                    *cell_start,
                    vec![
                        Event::Start(BytesStart::new("w:tcPr")),
                        Event::Empty(auto_width("w:tcW")),
                        Event::End(BytesEnd::new("w:tcPr")),
                    ],
                );
            }
        }
    }
}

/// Replaces a leaf element inside the range with a single event, dropping the
/// original through its end tag. Returns whether the element was found.
fn replace_leaf(
    events: &[Event],
    start: usize,
    end: usize,
    tag: QName,
    replacement: Event<'static>,
    patch: &mut Patch,
) -> bool {
    for index in start..=end {
        if let Event::Start(element) = &events[index] {
            if element.name() == tag {
                patch.replaced.insert(index, vec![replacement]);
                let mut cursor = index + 1;
                while cursor <= end {
                    let is_end = matches!(&events[cursor], Event::End(element) if element.name() == tag);
                    patch.dropped.insert(cursor);
                    if is_end {
                        break;
                    }
                    cursor += 1;
                }
                return true;
            }
        }
    }
    false
}

fn auto_width(name: &'static str) -> BytesStart<'static> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("w:w", "0"));
    element.push_attribute(("w:type", "auto"));
    element
}

fn autofit_layout() -> BytesStart<'static> {
    let mut element = BytesStart::new("w:tblLayout");
    element.push_attribute(("w:type", "autofit"));
    element
}

/// Appends one generated row. The cell text is set in Arial at 9pt (18
/// half-points) to keep wide tables compact.
fn push_row(events: &mut Vec<Event<'static>>, columns: usize, position: usize, values: &[String]) {
    let ordinal;
    let mut cells: Vec<&str> = Vec::with_capacity(columns);
    if columns > values.len() {
        ordinal = (position + 1).to_string();
        cells.push(&ordinal);
    }
    for value in values {
        if cells.len() == columns {
            break;
        }
        cells.push(blank_if_nan(value));
    }
    while cells.len() < columns {
        cells.push("");
    }

    events.push(Event::Start(BytesStart::new("w:tr")));
    for text in cells {
        events.push(Event::Start(BytesStart::new("w:tc")));
        events.push(Event::Start(BytesStart::new("w:tcPr")));
        events.push(Event::Empty(auto_width("w:tcW")));
        events.push(Event::End(BytesEnd::new("w:tcPr")));
        events.push(Event::Start(BytesStart::new("w:p")));
        events.push(Event::Start(BytesStart::new("w:r")));
        events.push(Event::Start(BytesStart::new("w:rPr")));
        let mut fonts = BytesStart::new("w:rFonts");
        fonts.push_attribute(("w:ascii", "Arial"));
        fonts.push_attribute(("w:hAnsi", "Arial"));
        fonts.push_attribute(("w:cs", "Arial"));
        events.push(Event::Empty(fonts));
        let mut size = BytesStart::new("w:sz");
        size.push_attribute(("w:val", "18"));
        events.push(Event::Empty(size));
        let mut size_cs = BytesStart::new("w:szCs");
        size_cs.push_attribute(("w:val", "18"));
        events.push(Event::Empty(size_cs));
        events.push(Event::End(BytesEnd::new("w:rPr")));
        let mut node = BytesStart::new("w:t");
        if needs_space_preserve(text.split('\n').next().unwrap_or("")) {
            node.push_attribute(("xml:space", "preserve"));
        }
        events.push(Event::Start(node));
        events.extend(run_text_events(text));
        events.push(Event::End(BytesEnd::new("w:t")));
        events.push(Event::End(BytesEnd::new("w:r")));
        events.push(Event::End(BytesEnd::new("w:p")));
        events.push(Event::End(BytesEnd::new("w:tc")));
    }
    events.push(Event::End(BytesEnd::new("w:tr")));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(body: &str) -> Package {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        Package::from_parts(vec![(DOCUMENT_PART.to_owned(), xml.into_bytes())])
    }

    fn keyword_matcher(keyword: &str) -> impl Fn(&str) -> bool + '_ {
        move |text: &str| text.to_lowercase().contains(&keyword.to_lowercase())
    }

    const TEMPLATE: &str = r#"<w:tbl><w:tblPr><w:tblW w:w="9350" w:type="dxa"/><w:tblLayout w:type="fixed"/></w:tblPr><w:tblGrid><w:gridCol w:w="500"/><w:gridCol w:w="4000"/><w:gridCol w:w="4000"/></w:tblGrid><w:tr><w:tc><w:tcPr><w:tcW w:w="500" w:type="dxa"/></w:tcPr><w:p><w:r><w:t>No</w:t></w:r></w:p></w:tc><w:tc><w:tcPr><w:tcW w:w="4000" w:type="dxa"/></w:tcPr><w:p><w:r><w:t>NE Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Type</w:t></w:r></w:p></w:tc></w:tr><w:tr><w:tc><w:p><w:r><w:t>old row</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#;

    fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|row| row.iter().map(|value| value.to_string()).collect())
            .collect()
    }

    #[test]
    fn fills_rows_with_ordinal_column() {
        let mut package = document(TEMPLATE);
        let filled = materialize(
            &mut package,
            keyword_matcher("ne name"),
            &rows(&[&["host-1", "X7"], &["host-2", "nan"]]),
        )
        .unwrap();
        assert!(filled);

        let xml = String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap();
        assert!(!xml.contains("old row"));
        assert!(xml.contains("<w:t>1</w:t>"));
        assert!(xml.contains("<w:t>2</w:t>"));
        assert!(xml.contains("<w:t>host-1</w:t>"));
        assert!(xml.contains("<w:t>host-2</w:t>"));
        // The "nan" marker renders as an empty cell
        assert!(!xml.contains("nan"));
        // Header row plus the two generated rows
        assert_eq!(xml.matches("<w:tr>").count(), 3);
    }

    #[test]
    fn widths_switch_to_auto() {
        let mut package = document(TEMPLATE);
        materialize(&mut package, keyword_matcher("ne name"), &rows(&[&["host-1", "X7"]])).unwrap();
        let xml = String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap();
        assert_eq!(xml.matches(r#"<w:tblW w:w="0" w:type="auto"/>"#).count(), 1);
        assert!(xml.contains(r#"<w:tblLayout w:type="autofit"/>"#));
        assert!(!xml.contains(r#"w:type="dxa""#));
        // Three header cells plus three cells of the generated row
        assert_eq!(xml.matches(r#"<w:tcW w:w="0" w:type="auto"/>"#).count(), 6);
    }

    #[test]
    fn generated_cells_use_compact_font() {
        let mut package = document(TEMPLATE);
        materialize(&mut package, keyword_matcher("ne name"), &rows(&[&["host-1", "X7"]])).unwrap();
        let xml = String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap();
        assert_eq!(xml.matches(r#"w:ascii="Arial""#).count(), 3);
        assert_eq!(xml.matches(r#"<w:sz w:val="18"/>"#).count(), 3);
    }

    #[test]
    fn second_table_can_match() {
        let first = r#"<w:tbl><w:tblGrid><w:gridCol/></w:tblGrid><w:tr><w:tc><w:p><w:r><w:t>Summary</w:t></w:r></w:p></w:tc></w:tr><w:tr><w:tc><w:p><w:r><w:t>keep me</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#;
        let mut package = document(&format!("{first}{TEMPLATE}"));
        let filled = materialize(&mut package, keyword_matcher("ne name"), &rows(&[&["host-1", "X7"]])).unwrap();
        assert!(filled);
        let xml = String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap();
        assert!(xml.contains("keep me"));
        assert!(!xml.contains("old row"));
    }

    #[test]
    fn no_matching_table_leaves_part_alone() {
        let mut package = document(TEMPLATE);
        let before = package.part(DOCUMENT_PART).unwrap().to_vec();
        let filled = materialize(&mut package, keyword_matcher("does not exist"), &rows(&[&["a"]])).unwrap();
        assert!(!filled);
        assert_eq!(package.part(DOCUMENT_PART).unwrap(), before.as_slice());
    }

    #[test]
    fn extra_values_are_dropped_without_grid() {
        let template = r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>NE Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Type</w:t></w:r></w:p></w:tc></w:tr><w:tr><w:tc><w:p><w:r><w:t>old</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#;
        let mut package = document(template);
        materialize(&mut package, keyword_matcher("ne name"), &rows(&[&["a", "b", "c"]])).unwrap();
        let xml = String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap();
        assert!(xml.contains("<w:t>a</w:t>"));
        assert!(xml.contains("<w:t>b</w:t>"));
        assert!(!xml.contains("<w:t>c</w:t>"));
    }
}
