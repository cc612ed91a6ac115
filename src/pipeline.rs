//! Document assembly driver: fills one template copy per ring group, saves
//! the results into a timestamped run folder and zips them up next to it.

use crate::compress::shrink_if_oversize;
use crate::docx::image::insert_image;
use crate::docx::package::Package;
use crate::docx::table::materialize;
use crate::docx::text::substitute;
use crate::error::{ResultMessage, RingdocError};
use crate::group::{partition, Group};
use crate::helpers::text::sanitize_file_name;
use crate::scope::{ScopeConfig, ScopeError, Settings};
use crate::sheet::xlsx::Workbook;
use crate::sheet::{SheetError, Table};
use chrono::{Days, Local, NaiveDate};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const TITLE_PLACEHOLDER: &str = "{{DOC_TITLE}}";
const DATE_PLACEHOLDER: &str = "{{DOC_DATE}}";
const CHANGE_TIME_PLACEHOLDER: &str = "{{CHANGE_TIME}}";
const CHANGE_SCOPE_PLACEHOLDER: &str = "{{CHANGE_SCOPE}}";
const RING_121_PLACEHOLDER: &str = "{{CHANGE_RING_121}}";
const TOPOLOGY_IMAGE_PLACEHOLDER: &str = "{{TOPOLOGY_IMAGE}}";
const IMAGE_FALLBACK_TEXT: &str = "[Gambar topologi tidak tersedia]";

/// What a pipeline run produced.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub(crate) output_dir: PathBuf,
    pub(crate) zip_path: PathBuf,
    pub(crate) files: Vec<PathBuf>,
    pub(crate) warnings: Vec<String>,
}

/// Runs the whole pipeline for one scope: read the source sheet, group the
/// rows by ring, fill one document per group, and archive the run.
///
/// Schema and template problems abort before anything is written. A missing
/// data table or image only warns; the affected document is still produced
/// and the warning is returned with the outcome.
pub(crate) fn generate(
    excel_path: &str,
    scope_key: &str,
    scope: &ScopeConfig,
    images: &HashMap<String, PathBuf>,
    settings: &Settings,
    output_root: &Path,
) -> Result<RunOutcome, RingdocError> {
    let template = settings.template_path(&scope.template_file);
    if !template.is_file() {
        return Err(RingdocError::ScopeError(ScopeError::MissingTemplateError(
            template.display().to_string(),
        )));
    }

    let mut workbook = Workbook::open(excel_path)?;
    let table = workbook.read_table(&scope.excel_sheet)?;
    log::info!("Read {} row(s) from sheet '{}'", table.rows.len(), scope.excel_sheet);

    let mut required: Vec<&str> = scope.columns_mapping.iter().map(String::as_str).collect();
    required.push(scope.ring_col.as_str());
    required.push(scope.title_col.as_str());
    table.require_columns(required)?;

    let ring_col = require_column(&table, &scope.ring_col)?;
    let title_col = require_column(&table, &scope.title_col)?;
    let mut mapping = Vec::new();
    for name in &scope.columns_mapping {
        mapping.push(require_column(&table, name)?);
    }

    let groups = partition(&table, ring_col, title_col);
    log::info!("Found {} document group(s)", groups.len());

    let started = Local::now();
    let run_name = format!("Hasil_{}_{}", scope_key, started.format("%Y-%m-%d_%H%M%S"));
    let output_dir = output_root.join(&run_name);
    fs::create_dir_all(&output_dir)
        .map_err(RingdocError::IoError)
        .with_prefix("Cannot create the output folder")?;

    let date_text = started.format("%d-%b").to_string();
    let window_text = change_window(started.date_naive());

    let mut warnings: Vec<String> = Vec::new();
    let mut files: Vec<PathBuf> = Vec::new();
    let mut used_names: HashMap<String, usize> = HashMap::new();

    for (index, group) in groups.iter().enumerate() {
        log::info!("[{}/{}] Processing '{}'", index + 1, groups.len(), group.title);
        let mut package = Package::open(&template)?;

        let replaced = substitute(&mut package, TITLE_PLACEHOLDER, &group.title)?;
        if replaced == 0 {
            log::warn!("Template has no {} placeholder", TITLE_PLACEHOLDER);
        }
        substitute(&mut package, DATE_PLACEHOLDER, &date_text)?;
        substitute(&mut package, CHANGE_TIME_PLACEHOLDER, &window_text)?;
        substitute(&mut package, CHANGE_SCOPE_PLACEHOLDER, &scope_text(&table, scope, group))?;
        substitute(&mut package, RING_121_PLACEHOLDER, ring_121_text(&table, scope, group))?;

        if scope.has_topology_image {
            embed_topology_image(&mut package, group, images, &mut warnings)?;
        }

        let data = mapped_rows(&table, group, &mapping);
        let matched = materialize(&mut package, |header| header.contains(scope.table_keyword.as_str()), &data)?;
        if !matched {
            let warning = format!("'{}': no table header contains '{}'", group.title, scope.table_keyword);
            log::warn!("{}", warning);
            warnings.push(warning);
        }

        let file_name = reserve_file_name(&mut used_names, &group.title);
        let path = output_dir.join(&file_name);
        package.save(&path)?;

        match shrink_if_oversize(&path, settings.compress_threshold_mb * 1024 * 1024) {
            Ok(true) => log::info!("Recompressed {}", file_name),
            Ok(false) => (),
            Err(error) => {
                let warning = format!("'{}': recompression failed: {}", file_name, error);
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
        files.push(path);
    }

    let zip_path = output_root.join(format!("{}.zip", run_name));
    write_archive(&zip_path, &files)?;
    log::info!("Archived {} document(s) into {}", files.len(), zip_path.display());

    Ok(RunOutcome {
        output_dir,
        zip_path,
        files,
        warnings,
    })
}

/// Lists the normalized group keys a source file would produce, as a
/// pre-flight check before running the whole pipeline.
pub(crate) fn list_rings(excel_path: &str, scope: &ScopeConfig) -> Result<Vec<String>, RingdocError> {
    let mut workbook = Workbook::open(excel_path)?;
    let table = workbook.read_table(&scope.excel_sheet)?;
    let ring_col = require_column(&table, &scope.ring_col)?;
    let title_col = require_column(&table, &scope.title_col)?;
    Ok(partition(&table, ring_col, title_col)
        .into_iter()
        .map(|group| group.key)
        .collect())
}

fn require_column(table: &Table, name: &str) -> Result<usize, RingdocError> {
    table.column_index(name).ok_or_else(|| {
        SheetError::SchemaError(table.name.to_owned(), name.to_owned(), table.headers.join(", ")).into()
    })
}

/// The maintenance window substituted for the change-time placeholder: a
/// 23:00 to 05:00 window spanning thirty days from the run date.
fn change_window(start: NaiveDate) -> String {
    let end = start.checked_add_days(Days::new(30)).unwrap_or(start);
    format!("23:00 {} - 05:00 {}", start.format("%d %b %Y"), end.format("%d %b %Y"))
}

/// Scope text for a group: a device tally when the scope has a summary
/// column, else the first row's region, else "All region".
fn scope_text(table: &Table, scope: &ScopeConfig, group: &Group) -> String {
    let first = group.rows.first().copied().unwrap_or_default();
    if let Some(column) = scope.device_summary_col.as_deref().and_then(|name| table.column_index(name)) {
        return device_summary(table, group, column);
    }
    if let Some(column) = scope.region_col.as_deref().and_then(|name| table.column_index(name)) {
        let region = table.clean_value(first, column);
        if !region.is_empty() {
            return format!("{} region", region);
        }
    }
    "All region".to_owned()
}

/// Tallies the device type column over the group's rows, most frequent type
/// first. Placeholder "nan" values count toward the total but get no line.
fn device_summary(table: &Table, group: &Group, column: usize) -> String {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut total = 0;
    for &row in &group.rows {
        let value = table.value(row, column).trim();
        if value.is_empty() {
            continue;
        }
        total += 1;
        match counts.iter_mut().find(|(name, _)| name == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value.to_owned(), 1)),
        }
    }
    counts.sort_by(|left, right| right.1.cmp(&left.1));
    let mut lines = vec![format!("Total {} Device:", total)];
    for (name, count) in &counts {
        if !name.eq_ignore_ascii_case("nan") {
            lines.push(format!("{} * {}", count, name));
        }
    }
    lines.join("\n")
}

/// The ring 1-2-1 value: the scope's alternate ring column when configured
/// and filled, else the group key.
fn ring_121_text<'a>(table: &'a Table, scope: &ScopeConfig, group: &'a Group) -> &'a str {
    let first = group.rows.first().copied().unwrap_or_default();
    scope
        .ring_121_col
        .as_deref()
        .and_then(|name| table.column_index(name))
        .map(|column| table.clean_value(first, column))
        .filter(|value| !value.is_empty())
        .unwrap_or(&group.key)
}

/// Embeds the group's topology image where the placeholder sits. Without an
/// image (or when embedding fails) the placeholder becomes a literal
/// not-available note instead.
fn embed_topology_image(
    package: &mut Package,
    group: &Group,
    images: &HashMap<String, PathBuf>,
    warnings: &mut Vec<String>,
) -> Result<(), RingdocError> {
    let mut inserted = false;
    if let Some(path) = images.get(&group.key).filter(|path| path.is_file()) {
        match insert_image(package, TOPOLOGY_IMAGE_PLACEHOLDER, path) {
            Ok(true) => {
                log::info!("Embedded topology image for '{}'", group.key);
                inserted = true;
            }
            Ok(false) => log::warn!("No {} placeholder for '{}'", TOPOLOGY_IMAGE_PLACEHOLDER, group.key),
            Err(error) => {
                let warning = format!("'{}': topology image skipped: {}", group.key, error);
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
    } else {
        log::info!("No topology image for '{}'", group.key);
    }
    if !inserted {
        substitute(package, TOPOLOGY_IMAGE_PLACEHOLDER, IMAGE_FALLBACK_TEXT)?;
    }
    Ok(())
}

fn mapped_rows(table: &Table, group: &Group, mapping: &[usize]) -> Vec<Vec<String>> {
    group
        .rows
        .iter()
        .map(|&row| mapping.iter().map(|&column| table.value(row, column).to_owned()).collect())
        .collect()
}

/// Turns a group title into a unique output file name. Titles that sanitize
/// to the same base get a numeric suffix instead of overwriting each other.
fn reserve_file_name(used: &mut HashMap<String, usize>, title: &str) -> String {
    let mut base = sanitize_file_name(title);
    if base.is_empty() {
        base = "Document".to_owned();
    }
    let count = used.entry(base.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        format!("{}.docx", base)
    } else {
        format!("{} ({}).docx", base, count)
    }
}

/// Zips the generated documents at the archive root under their base names.
fn write_archive(path: &Path, files: &[PathBuf]) -> Result<(), RingdocError> {
    let output = File::create(path)?;
    let mut writer = ZipWriter::new(BufWriter::new(output));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        let name = file.file_name().and_then(OsStr::to_str).unwrap_or("document.docx");
        writer.start_file(name, options)?;
        writer.write_all(&fs::read(file)?)?;
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::package::DOCUMENT_PART;
    use crate::sheet::writer::write_table;

    const TEMPLATE_DOCUMENT: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        "<w:p><w:r><w:t>{{DOC_TITLE}}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>Issued {{DOC_DATE}}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{{CHANGE_TIME}}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{{CHANGE_SCOPE}}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{{CHANGE_RING_121}}</w:t></w:r></w:p>",
        "<w:p><w:r><w:t>{{TOPOLOGY_IMAGE}}</w:t></w:r></w:p>",
        "<w:tbl>",
        "<w:tblGrid><w:gridCol/><w:gridCol/><w:gridCol/></w:tblGrid>",
        "<w:tr><w:tc><w:p><w:r><w:t>No</w:t></w:r></w:p></w:tc>",
        "<w:tc><w:p><w:r><w:t>Device List</w:t></w:r></w:p></w:tc>",
        "<w:tc><w:p><w:r><w:t>Type</w:t></w:r></w:p></w:tc></w:tr>",
        "<w:tr><w:tc><w:p><w:r><w:t>stale</w:t></w:r></w:p></w:tc>",
        "<w:tc><w:p><w:r><w:t>stale</w:t></w:r></w:p></w:tc>",
        "<w:tc><w:p><w:r><w:t>stale</w:t></w:r></w:p></w:tc></w:tr>",
        "</w:tbl>",
        "</w:body></w:document>",
    );

    const HEADER_PART: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        "<w:p><w:r><w:t>{{DOC_TITLE}}</w:t></w:r></w:p></w:hdr>",
    );

    const CONTENT_TYPES: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/></Types>"#,
    );

    fn write_template(folder: &Path, name: &str, parts: Vec<(&str, &str)>) {
        let mut entries = vec![("[Content_Types].xml".to_owned(), CONTENT_TYPES.as_bytes().to_vec())];
        entries.extend(
            parts
                .into_iter()
                .map(|(part, xml)| (part.to_owned(), xml.as_bytes().to_vec())),
        );
        Package::from_parts(entries).save(&folder.join(name)).unwrap();
    }

    fn write_source(folder: &Path, rows: Vec<Vec<&str>>) -> String {
        let headers = ["Ring", "Title", "NE Name", "NE Type"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(str::to_owned).collect())
            .collect();
        let path = folder.join("source.xlsx");
        write_table(&path, &Table::new("Data", headers, rows)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn test_scope() -> ScopeConfig {
        ScopeConfig {
            template_file: "template.docx".to_owned(),
            excel_sheet: "Data".to_owned(),
            table_keyword: "Device List".to_owned(),
            title_col: "Title".to_owned(),
            ring_col: "Ring".to_owned(),
            columns_mapping: vec!["NE Name".to_owned(), "NE Type".to_owned()],
            region_col: None,
            ring_121_col: None,
            device_summary_col: None,
            has_topology_image: false,
        }
    }

    fn test_settings(folder: &Path) -> Settings {
        Settings {
            output_folder: folder.join("output").to_string_lossy().into_owned(),
            templates_folder: folder.to_string_lossy().into_owned(),
            compress_threshold_mb: 1,
        }
    }

    fn document_text(path: &Path) -> String {
        let package = Package::open(path).unwrap();
        String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn splits_groups_and_fills_documents() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "template.docx", vec![(DOCUMENT_PART, TEMPLATE_DOCUMENT)]);
        let excel = write_source(
            dir.path(),
            vec![
                vec!["Ring A", "Doc Ring A", "host-1", "H35"],
                vec![" Ring  A ", "other title", "host-2", "H35"],
                vec!["Ring B", "Doc Ring B", "host-3", "H49"],
            ],
        );
        let output_root = dir.path().join("output");
        let outcome = generate(&excel, "Metro", &test_scope(), &HashMap::new(), &test_settings(dir.path()), &output_root).unwrap();

        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.warnings.is_empty());

        // Whitespace variants of "Ring A" coalesce into one document with two rows
        let first = document_text(&outcome.files[0]);
        assert!(first.contains("Doc Ring A"));
        assert!(!first.contains("{{DOC_TITLE}}"));
        assert!(!first.contains("{{CHANGE_TIME}}"));
        assert!(first.contains("All region"));
        assert_eq!(first.matches("<w:tr>").count(), 3);
        assert!(first.contains(">host-1<"));
        assert!(first.contains(">host-2<"));
        assert!(!first.contains("stale"));
        // Three grid columns against two mapped ones puts ordinals in front
        assert!(first.contains("<w:t>1</w:t>"));
        assert!(first.contains("<w:t>2</w:t>"));
        // Without a topology flag the placeholder is left alone
        assert!(first.contains("{{TOPOLOGY_IMAGE}}"));

        let second = document_text(&outcome.files[1]);
        assert!(second.contains("Doc Ring B"));
        assert_eq!(second.matches("<w:tr>").count(), 2);

        let mut archive = zip::ZipArchive::new(File::open(&outcome.zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|index| archive.by_index(index).unwrap().name().to_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Doc Ring A.docx", "Doc Ring B.docx"]);
    }

    #[test]
    fn title_reaches_header_parts() {
        let dir = tempfile::tempdir().unwrap();
        let body_without_title =
            TEMPLATE_DOCUMENT.replace("<w:p><w:r><w:t>{{DOC_TITLE}}</w:t></w:r></w:p>", "");
        write_template(
            dir.path(),
            "template.docx",
            vec![(DOCUMENT_PART, &body_without_title), ("word/header1.xml", HEADER_PART)],
        );
        let excel = write_source(dir.path(), vec![vec!["Ring A", "Doc Ring A", "host-1", "H35"]]);
        let output_root = dir.path().join("output");
        let outcome = generate(&excel, "Metro", &test_scope(), &HashMap::new(), &test_settings(dir.path()), &output_root).unwrap();

        let package = Package::open(&outcome.files[0]).unwrap();
        let header = String::from_utf8(package.part("word/header1.xml").unwrap().to_vec()).unwrap();
        assert!(header.contains("Doc Ring A"));
        assert!(!header.contains("{{DOC_TITLE}}"));
    }

    #[test]
    fn missing_topology_image_renders_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "template.docx", vec![(DOCUMENT_PART, TEMPLATE_DOCUMENT)]);
        let excel = write_source(dir.path(), vec![vec!["Ring A", "Doc Ring A", "host-1", "H35"]]);
        let mut scope = test_scope();
        scope.has_topology_image = true;
        let output_root = dir.path().join("output");
        let outcome = generate(&excel, "Metro", &scope, &HashMap::new(), &test_settings(dir.path()), &output_root).unwrap();

        let text = document_text(&outcome.files[0]);
        assert!(text.contains(IMAGE_FALLBACK_TEXT));
        assert!(!text.contains("{{TOPOLOGY_IMAGE}}"));
        assert!(!text.contains("<w:drawing"));
        let package = Package::open(&outcome.files[0]).unwrap();
        assert!(package.part("word/media/image1.png").is_none());
    }

    #[test]
    fn topology_image_is_embedded_when_supplied() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "template.docx", vec![(DOCUMENT_PART, TEMPLATE_DOCUMENT)]);
        let excel = write_source(dir.path(), vec![vec!["Ring A", "Doc Ring A", "host-1", "H35"]]);
        let image_path = dir.path().join("topo.png");
        image::RgbaImage::new(4, 2).save(&image_path).unwrap();
        let images = HashMap::from([("Ring A".to_owned(), image_path)]);
        let mut scope = test_scope();
        scope.has_topology_image = true;
        let output_root = dir.path().join("output");
        let outcome = generate(&excel, "Metro", &scope, &images, &test_settings(dir.path()), &output_root).unwrap();

        assert!(outcome.warnings.is_empty());
        let text = document_text(&outcome.files[0]);
        assert!(text.contains("<w:drawing"));
        assert!(!text.contains(IMAGE_FALLBACK_TEXT));
        let package = Package::open(&outcome.files[0]).unwrap();
        assert!(package.part("word/media/image1.png").is_some());
    }

    #[test]
    fn duplicate_titles_get_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "template.docx", vec![(DOCUMENT_PART, TEMPLATE_DOCUMENT)]);
        let excel = write_source(
            dir.path(),
            vec![
                vec!["Ring A", "Site Doc", "host-1", "H35"],
                vec!["Ring B", "Site Doc", "host-2", "H49"],
            ],
        );
        let output_root = dir.path().join("output");
        let outcome = generate(&excel, "Metro", &test_scope(), &HashMap::new(), &test_settings(dir.path()), &output_root).unwrap();

        let names: Vec<&str> = outcome
            .files
            .iter()
            .filter_map(|path| path.file_name().and_then(OsStr::to_str))
            .collect();
        assert_eq!(names, vec!["Site Doc.docx", "Site Doc (2).docx"]);
    }

    #[test]
    fn missing_table_is_a_warning_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "template.docx", vec![(DOCUMENT_PART, TEMPLATE_DOCUMENT)]);
        let excel = write_source(dir.path(), vec![vec!["Ring A", "Doc Ring A", "host-1", "H35"]]);
        let mut scope = test_scope();
        scope.table_keyword = "Absent Keyword".to_owned();
        let output_root = dir.path().join("output");
        let outcome = generate(&excel, "Metro", &scope, &HashMap::new(), &test_settings(dir.path()), &output_root).unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Absent Keyword"));
        let text = document_text(&outcome.files[0]);
        assert!(text.contains("Doc Ring A"));
        // The table body stays as it was
        assert!(text.contains("stale"));
    }

    #[test]
    fn missing_columns_abort_before_output() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "template.docx", vec![(DOCUMENT_PART, TEMPLATE_DOCUMENT)]);
        let excel = write_source(dir.path(), vec![vec!["Ring A", "Doc Ring A", "host-1", "H35"]]);
        let mut scope = test_scope();
        scope.columns_mapping.push("Serial".to_owned());
        let output_root = dir.path().join("output");
        let error = generate(&excel, "Metro", &scope, &HashMap::new(), &test_settings(dir.path()), &output_root)
            .unwrap_err();

        assert!(error.to_string().contains("Serial"));
        assert!(!output_root.exists());
    }

    #[test]
    fn missing_template_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let excel = write_source(dir.path(), vec![vec!["Ring A", "Doc Ring A", "host-1", "H35"]]);
        let output_root = dir.path().join("output");
        let error = generate(&excel, "Metro", &test_scope(), &HashMap::new(), &test_settings(dir.path()), &output_root)
            .unwrap_err();
        assert!(error.to_string().contains("template.docx"));
    }

    #[test]
    fn rings_listing_normalizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let excel = write_source(
            dir.path(),
            vec![
                vec!["Ring  B", "Doc B", "host-1", "H35"],
                vec!["Ring A", "Doc A", "host-2", "H35"],
                vec!["", "skipped", "host-3", "H35"],
            ],
        );
        let rings = list_rings(&excel, &test_scope()).unwrap();
        assert_eq!(rings, vec!["Ring A", "Ring B"]);
    }

    #[test]
    fn change_window_spans_thirty_days() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(change_window(date), "23:00 07 Mar 2025 - 05:00 06 Apr 2025");
    }

    #[test]
    fn device_summary_counts_descending() {
        let table = Table::new(
            "Data",
            vec!["Type".to_owned()],
            vec![
                vec!["H35".to_owned()],
                vec!["H49".to_owned()],
                vec!["H49".to_owned()],
                vec!["nan".to_owned()],
                vec!["".to_owned()],
            ],
        );
        let group = Group {
            key: "Ring A".to_owned(),
            title: "Doc".to_owned(),
            rows: vec![0, 1, 2, 3, 4],
        };
        assert_eq!(device_summary(&table, &group, 0), "Total 4 Device:\n2 * H49\n1 * H35");
    }

    #[test]
    fn scope_text_prefers_summary_then_region() {
        let table = Table::new(
            "Data",
            vec!["Region".to_owned(), "Type".to_owned()],
            vec![vec!["Jabodetabek".to_owned(), "H35".to_owned()]],
        );
        let group = Group {
            key: "Ring A".to_owned(),
            title: "Doc".to_owned(),
            rows: vec![0],
        };

        let mut scope = test_scope();
        assert_eq!(scope_text(&table, &scope, &group), "All region");
        scope.region_col = Some("Region".to_owned());
        assert_eq!(scope_text(&table, &scope, &group), "Jabodetabek region");
        scope.device_summary_col = Some("Type".to_owned());
        assert_eq!(scope_text(&table, &scope, &group), "Total 1 Device:\n1 * H35");
    }

    #[test]
    fn file_names_are_sanitized_and_deduplicated() {
        let mut used = HashMap::new();
        assert_eq!(reserve_file_name(&mut used, "Ring: A/B?"), "Ring AB.docx");
        assert_eq!(reserve_file_name(&mut used, "Ring A\\B"), "Ring AB (2).docx");
        assert_eq!(reserve_file_name(&mut used, "***"), "Document.docx");
    }
}
