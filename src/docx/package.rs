//! DOCX package access. Parts are held in memory in archive order; media
//! parts are stored without recompression when the package is written back.

use crate::docx::DocxError;
use crate::error::RingdocError;
use crate::error::ResultMessage;
use crate::helpers::xml::read_events;
use crate::helpers::xml::write_events;
use crate::helpers::xml::XmlNodeHelper;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

pub(crate) const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_RELATIONSHIP_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const EMPTY_RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

/// A DOCX file loaded into memory as (part name, bytes) pairs.
pub(crate) struct Package {
    /// Source file name, kept for error messages
    name: String,
    /// Parts in archive order
    entries: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Loads every part of a DOCX file into memory.
    pub(crate) fn open(path: &Path) -> Result<Package, RingdocError> {
        let name = path.display().to_string();
        let prefix = format!("Cannot read document '{name}'");
        let file = File::open(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(RingdocError::ZipError).with_prefix(&prefix)?;

        let mut entries = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let mut part = zip.by_index(index).map_err(RingdocError::ZipError).with_prefix(&prefix)?;
            if part.is_dir() {
                continue;
            }
            let part_name = part.name().to_owned();
            let mut bytes = Vec::with_capacity(part.size() as usize);
            part.read_to_end(&mut bytes).map_err(RingdocError::IoError).with_prefix(&prefix)?;
            entries.push((part_name, bytes));
        }

        let package = Package { name, entries };
        if package.part(DOCUMENT_PART).is_none() {
            Err(DocxError::MissingPartError(package.name.to_owned(), DOCUMENT_PART.to_owned()))?
        }
        Ok(package)
    }

    /// Returns a part's bytes by exact name.
    pub(crate) fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Replaces a part's bytes, appending the part if it does not exist yet.
    pub(crate) fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some((_, existing)) => *existing = bytes,
            None => self.entries.push((name.to_owned(), bytes)),
        }
    }

    /// Names of the parts that carry document text: the main document first,
    /// then headers and footers in archive order.
    pub(crate) fn text_part_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.part(DOCUMENT_PART).is_some() {
            names.push(DOCUMENT_PART.to_owned());
        }
        for (name, _) in &self.entries {
            if (name.starts_with("word/header") || name.starts_with("word/footer")) && name.ends_with(".xml") {
                names.push(name.to_owned());
            }
        }
        names
    }

    /// Picks the next free media part name, e.g. `word/media/image3.png`.
    pub(crate) fn next_media_name(&self, extension: &str) -> String {
        let mut highest = 0usize;
        for (name, _) in &self.entries {
            if let Some(number) = name
                .strip_prefix("word/media/image")
                .and_then(|rest| rest.split('.').next())
                .and_then(|stem| stem.parse::<usize>().ok())
            {
                highest = highest.max(number);
            }
        }
        format!("word/media/image{}.{extension}", highest + 1)
    }

    /// Makes sure `[Content_Types].xml` declares a default content type for
    /// the given extension; no change when a declaration already exists.
    pub(crate) fn ensure_content_type_default(&mut self, extension: &str, content_type: &str) -> Result<(), RingdocError> {
        let bytes = self.part(CONTENT_TYPES_PART).ok_or_else(|| {
            DocxError::MissingPartError(self.name.to_owned(), CONTENT_TYPES_PART.to_owned())
        })?;
        let mut events = read_events(bytes)?;
        for event in &events {
            if let Event::Start(element) = event {
                if element.local_name().as_ref() == b"Default" {
                    let declared = element.get_attribute_value("Extension")?;
                    if declared.map(|value| value.eq_ignore_ascii_case(extension)).unwrap_or(false) {
                        return Ok(());
                    }
                }
            }
        }

        let position = events
            .iter()
            .rposition(|event| matches!(event, Event::End(end) if end.local_name().as_ref() == b"Types"))
            .ok_or_else(|| DocxError::MissingPartError(self.name.to_owned(), CONTENT_TYPES_PART.to_owned()))?;
        let mut element = BytesStart::new("Default");
        element.push_attribute(("Extension", extension));
        element.push_attribute(("ContentType", content_type));
        events.insert(position, Event::Empty(element));

        let bytes = write_events(events.iter())?;
        self.set_part(CONTENT_TYPES_PART, bytes);
        Ok(())
    }

    /// Registers an image relationship on the main document part and returns
    /// the new relationship ID. The relationships part is created when absent.
    pub(crate) fn add_image_relationship(&mut self, target: &str) -> Result<String, RingdocError> {
        let bytes = match self.part(DOCUMENT_RELATIONSHIPS_PART) {
            Some(bytes) => bytes,
            None => EMPTY_RELATIONSHIPS.as_bytes(),
        };
        let mut events = read_events(bytes)?;

        let mut highest = 0usize;
        for event in &events {
            if let Event::Start(element) = event {
                if element.local_name().as_ref() == b"Relationship" {
                    let id = element.get_attribute_value("Id")?;
                    if let Some(number) = id.as_deref().and_then(|value| value.strip_prefix("rId")) {
                        if let Ok(number) = number.parse::<usize>() {
                            highest = highest.max(number);
                        }
                    }
                }
            }
        }

        let id = format!("rId{}", highest + 1);
        let position = events
            .iter()
            .rposition(|event| matches!(event, Event::End(end) if end.local_name().as_ref() == b"Relationships"))
            .ok_or_else(|| DocxError::MissingPartError(self.name.to_owned(), DOCUMENT_RELATIONSHIPS_PART.to_owned()))?;
        let mut element = BytesStart::new("Relationship");
        element.push_attribute(("Id", id.as_str()));
        element.push_attribute(("Type", IMAGE_RELATIONSHIP_TYPE));
        element.push_attribute(("Target", target));
        events.insert(position, Event::Empty(element));

        let bytes = write_events(events.iter())?;
        self.set_part(DOCUMENT_RELATIONSHIPS_PART, bytes);
        Ok(id)
    }

    /// Writes the package to a file.
    pub(crate) fn save(&self, path: &Path) -> Result<(), RingdocError> {
        let prefix = format!("Cannot write document '{}'", path.display());
        let file = File::create(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        self.write_to(file).with_prefix(&prefix)
    }

    /// Writes the package into any seekable sink. Media parts are stored as-is
    /// since image formats are already compressed.
    pub(crate) fn write_to<W: Write + Seek>(&self, writer: W) -> Result<(), RingdocError> {
        let mut zip = ZipWriter::new(writer);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in &self.entries {
            let options = if name.starts_with("word/media/") { stored } else { deflated };
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn from_parts(entries: Vec<(String, Vec<u8>)>) -> Package {
        Package {
            name: "test.docx".to_owned(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_package() -> Package {
        let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        let rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer1.xml"/></Relationships>"#;
        let document = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Hello</w:t></w:r></w:p></w:body></w:document>"#;
        Package::from_parts(vec![
            (CONTENT_TYPES_PART.to_owned(), content_types.as_bytes().to_vec()),
            ("_rels/.rels".to_owned(), b"<Relationships/>".to_vec()),
            (DOCUMENT_PART.to_owned(), document.as_bytes().to_vec()),
            (DOCUMENT_RELATIONSHIPS_PART.to_owned(), rels.as_bytes().to_vec()),
            ("word/footer1.xml".to_owned(), b"<w:ftr/>".to_vec()),
            ("word/media/image1.png".to_owned(), vec![1, 2, 3]),
        ])
    }

    #[test]
    fn text_parts_put_document_first() {
        let package = minimal_package();
        assert_eq!(package.text_part_names(), vec!["word/document.xml", "word/footer1.xml"]);
    }

    #[test]
    fn media_names_continue_from_highest() {
        let mut package = minimal_package();
        assert_eq!(package.next_media_name("png"), "word/media/image2.png");
        package.set_part("word/media/image7.jpeg", vec![0]);
        assert_eq!(package.next_media_name("png"), "word/media/image8.png");
    }

    #[test]
    fn content_type_default_added_once() {
        let mut package = minimal_package();
        package.ensure_content_type_default("png", "image/png").unwrap();
        let bytes = package.part(CONTENT_TYPES_PART).unwrap().to_vec();
        assert!(String::from_utf8(bytes.clone()).unwrap().contains(r#"Extension="png""#));
        // A second call leaves the part untouched
        package.ensure_content_type_default("png", "image/png").unwrap();
        assert_eq!(package.part(CONTENT_TYPES_PART).unwrap(), bytes.as_slice());
    }

    #[test]
    fn relationship_ids_skip_existing_numbers() {
        let mut package = minimal_package();
        let id = package.add_image_relationship("media/image2.png").unwrap();
        assert_eq!(id, "rId4");
        let rels = String::from_utf8(package.part(DOCUMENT_RELATIONSHIPS_PART).unwrap().to_vec()).unwrap();
        assert!(rels.contains(r#"Target="media/image2.png""#));
        assert!(rels.contains(IMAGE_RELATIONSHIP_TYPE));
    }

    #[test]
    fn relationships_part_created_when_absent() {
        let mut package = Package::from_parts(vec![(
            DOCUMENT_PART.to_owned(),
            b"<w:document/>".to_vec(),
        )]);
        let id = package.add_image_relationship("media/image1.png").unwrap();
        assert_eq!(id, "rId1");
        assert!(package.part(DOCUMENT_RELATIONSHIPS_PART).is_some());
    }

    #[test]
    fn save_and_reopen_round_trip() {
        let package = minimal_package();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        package.save(&path).unwrap();

        let reopened = Package::open(&path).unwrap();
        assert_eq!(reopened.part(DOCUMENT_PART), package.part(DOCUMENT_PART));
        assert_eq!(reopened.part("word/media/image1.png"), Some([1u8, 2, 3].as_slice()));
    }
}
