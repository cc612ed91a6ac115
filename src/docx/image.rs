//! Topology image embedding. The first paragraph carrying the placeholder is
//! emptied (its paragraph properties survive) and an inline drawing run is
//! spliced in, sized to the standard body or in-table width with the image's
//! aspect ratio preserved.

use crate::docx::package::Package;
use crate::docx::package::DOCUMENT_PART;
use crate::docx::text::apply_patch;
use crate::docx::text::find_element;
use crate::docx::text::paragraph_spans;
use crate::docx::text::text_between;
use crate::docx::text::ParagraphSpan;
use crate::docx::text::Patch;
use crate::docx::DocxError;
use crate::error::RingdocError;
use crate::error::ResultMessage;
use crate::helpers::xml::read_events;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::path::Path;

const TAG_PARAGRAPH_PROPERTIES: QName = QName(b"w:pPr");

// 914400 EMU per inch; 6.0" for body paragraphs, 5.5" inside table cells
const BODY_WIDTH_EMU: u64 = 5_486_400;
const TABLE_WIDTH_EMU: u64 = 5_029_200;

/// Embeds an image into the paragraph holding the placeholder. Paragraphs in
/// the document body are preferred over paragraphs inside tables. Returns
/// whether a placeholder paragraph was found.
pub(crate) fn insert_image(package: &mut Package, placeholder: &str, path: &Path) -> Result<bool, RingdocError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| DocxError::UnsupportedImageError(path.display().to_string()))?;
    let content_type = content_type_for(&extension)
        .ok_or_else(|| DocxError::UnsupportedImageError(path.display().to_string()))?;

    let prefix = format!("Cannot read image '{}'", path.display());
    let (pixel_width, pixel_height) = image::image_dimensions(path)
        .map_err(RingdocError::ImageError)
        .with_prefix(&prefix)?;
    if pixel_width == 0 || pixel_height == 0 {
        Err(DocxError::UnsupportedImageError(path.display().to_string()))?
    }
    let bytes = std::fs::read(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;

    let part = match package.part(DOCUMENT_PART) {
        Some(part) => part,
        None => return Ok(false),
    };
    let events = read_events(part)?;
    let span = match placeholder_span(&events, placeholder)? {
        Some(span) => span,
        None => return Ok(false),
    };

    let width = if span.in_table { TABLE_WIDTH_EMU } else { BODY_WIDTH_EMU };
    let height = width * u64::from(pixel_height) / u64::from(pixel_width);

    let media_name = package.next_media_name(&extension);
    let target = media_name.strip_prefix("word/").unwrap_or(&media_name).to_owned();
    let relationship_id = package.add_image_relationship(&target)?;
    package.ensure_content_type_default(&extension, content_type)?;
    package.set_part(&media_name, bytes);

    let shape_name = target.strip_prefix("media/").unwrap_or(&target).to_owned();
    let shape_id = shape_name
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse::<usize>()
        .unwrap_or(1);
    let drawing = drawing_xml(&relationship_id, &shape_name, shape_id, width, height);
    let run = read_events(drawing.as_bytes())?;

    // Empty the paragraph but keep its properties, then splice the run in
    let mut patch = Patch::default();
    let properties = if span.end > span.start + 1 {
        find_element(&events, span.start + 1, span.end - 1, TAG_PARAGRAPH_PROPERTIES)
    } else {
        None
    };
    for index in span.start + 1..span.end {
        let keep = properties
            .map(|(start, end)| index >= start && index <= end)
            .unwrap_or(false);
        if !keep {
            patch.dropped.insert(index);
        }
    }
    let anchor = properties.map(|(_, end)| end).unwrap_or(span.start);
    patch.inserted_after.insert(anchor, run);

    let bytes = apply_patch(&events, &patch)?;
    package.set_part(DOCUMENT_PART, bytes);
    Ok(true)
}

/// Finds the paragraph to receive the image: first match in the body, then
/// first match inside a table.
fn placeholder_span(events: &[Event], placeholder: &str) -> Result<Option<ParagraphSpan>, RingdocError> {
    let spans = paragraph_spans(events);
    for in_table in [false, true] {
        for span in spans.iter().filter(|span| span.in_table == in_table) {
            if text_between(events, span.start, span.end)?.contains(placeholder) {
                return Ok(Some(*span));
            }
        }
    }
    Ok(None)
}

fn content_type_for(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

/// Inline drawing markup with its namespaces declared locally, so the splice
/// stays valid no matter which prefixes the template document declares.
fn drawing_xml(relationship_id: &str, name: &str, id: usize, width: u64, height: u64) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing>"#,
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{width}" cy="{height}"/>"#,
            r#"<wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
            r#"<wp:docPr id="{id}" name="{name}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rid}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{width}" cy="{height}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
        ),
        width = width,
        height = height,
        id = id,
        name = name,
        rid = relationship_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(body: &str) -> Package {
        let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        Package::from_parts(vec![
            ("[Content_Types].xml".to_owned(), content_types.as_bytes().to_vec()),
            (DOCUMENT_PART.to_owned(), xml.into_bytes()),
        ])
    }

    fn sample_image(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("topo.png");
        image::RgbaImage::new(4, 2).save(&path).unwrap();
        path
    }

    fn document_xml(package: &Package) -> String {
        String::from_utf8(package.part(DOCUMENT_PART).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn body_paragraph_takes_scaled_drawing() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = sample_image(&dir);
        let mut package = document(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>{{TOPOLOGY}}</w:t></w:r></w:p>"#,
        );
        let inserted = insert_image(&mut package, "{{TOPOLOGY}}", &image_path).unwrap();
        assert!(inserted);

        let xml = document_xml(&package);
        assert!(!xml.contains("{{TOPOLOGY}}"));
        assert!(xml.contains(r#"cx="5486400" cy="2743200""#));
        assert!(xml.contains(r#"r:embed="rId1""#));
        // Paragraph alignment survives the splice
        assert!(xml.contains(r#"<w:jc w:val="center">"#) || xml.contains(r#"<w:jc w:val="center"/>"#));
        assert!(package.part("word/media/image1.png").is_some());
        let types = String::from_utf8(package.part("[Content_Types].xml").unwrap().to_vec()).unwrap();
        assert!(types.contains(r#"Extension="png""#));
    }

    #[test]
    fn table_paragraph_uses_narrow_width() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = sample_image(&dir);
        let mut package = document(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{TOPOLOGY}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let inserted = insert_image(&mut package, "{{TOPOLOGY}}", &image_path).unwrap();
        assert!(inserted);
        assert!(document_xml(&package).contains(r#"cx="5029200""#));
    }

    #[test]
    fn body_match_wins_over_table_match() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = sample_image(&dir);
        let mut package = document(concat!(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{TOPOLOGY}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            r#"<w:p><w:r><w:t>{{TOPOLOGY}}</w:t></w:r></w:p>"#,
        ));
        insert_image(&mut package, "{{TOPOLOGY}}", &image_path).unwrap();
        let xml = document_xml(&package);
        // The table copy keeps its placeholder; the body one got the image
        assert_eq!(xml.matches("{{TOPOLOGY}}").count(), 1);
        assert!(xml.contains(r#"cx="5486400""#));
    }

    #[test]
    fn missing_placeholder_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = sample_image(&dir);
        let mut package = document(r#"<w:p><w:r><w:t>plain</w:t></w:r></w:p>"#);
        let before = package.part(DOCUMENT_PART).unwrap().to_vec();
        let inserted = insert_image(&mut package, "{{TOPOLOGY}}", &image_path).unwrap();
        assert!(!inserted);
        assert_eq!(package.part(DOCUMENT_PART).unwrap(), before.as_slice());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.svg");
        std::fs::write(&path, b"<svg/>").unwrap();
        let mut package = document(r#"<w:p><w:r><w:t>{{TOPOLOGY}}</w:t></w:r></w:p>"#);
        assert!(insert_image(&mut package, "{{TOPOLOGY}}", &path).is_err());
    }
}
