//! XML parsing utilities shared by the spreadsheet reader and the document engine.
//! Provides a reader wrapper tuned for OOXML parts plus helper traits for
//! attribute and text processing.

use crate::error::RingdocError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub(crate) enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// XML reader wrapper with a configuration tolerant of real-world OOXML parts
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a new XML reader; empty elements are expanded so `<w:t/>` and
    /// `<w:t></w:t>` parse identically, and text is kept untrimmed because
    /// whitespace inside `w:t` nodes is significant.
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event from the reader
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, RingdocError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(RingdocError::XmlError(error)),
        }
    }
}

/// Buffers every event of an XML part into an owned vector.
/// The document engine edits parts as event sequences and serializes them back.
pub(crate) fn read_events(xml: &[u8]) -> Result<Vec<Event<'static>>, RingdocError> {
    let mut reader = XmlReader::new(xml);
    let mut events = Vec::new();
    while let Some(event) = reader.next()? {
        events.push(event.into_owned());
    }
    Ok(events)
}

/// Serializes a sequence of events back into part bytes.
pub(crate) fn write_events<'a, I>(events: I) -> Result<Vec<u8>, RingdocError>
where
    I: IntoIterator<Item = &'a Event<'a>>,
{
    let mut writer = Writer::new(Vec::with_capacity(4096));
    for event in events {
        // write_event takes the event by value
        writer.write_event(event.clone())?;
    }
    Ok(writer.into_inner())
}

/// Helper trait for XML attributes providing convenient value extraction and parsing
pub(crate) trait XmlAttributeHelper<'a> {
    /// Gets the unescaped attribute value as a string
    fn get_value(&self) -> Result<Cow<'a, str>, RingdocError>;

    /// Parses the attribute value to the specified type
    fn parse_value<T: FromStr>(&self) -> Result<T, RingdocError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, RingdocError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, RingdocError> {
        self.get_value()?
            .parse()
            .map_err(|_| match str::from_utf8(&self.value) {
                Ok(value) => RingdocError::XmlHelperError(XmlError::ParseAttributeValueError(value.to_string())),
                Err(error) => RingdocError::StringEncodingError(error),
            })
    }
}

/// Helper trait for XML nodes providing attribute access methods
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an attribute value by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RingdocError>;

    /// Parses an attribute value to the specified type
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, RingdocError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, RingdocError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, RingdocError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends text content from a BytesText event
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), RingdocError>;

    /// Appends text content from a BytesRef event (handles entities and character references)
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), RingdocError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), RingdocError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), RingdocError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                u32::from_str_radix(number, 10)?
            };
            if let Some(character) = std::char::from_u32(code) {
                self.push_str(character.encode_utf8(&mut [0u8; 4]));
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_preserves_structure() {
        let xml = br#"<?xml version="1.0"?><w:p><w:r><w:t xml:space="preserve">a &amp; b</w:t></w:r></w:p>"#;
        let events = read_events(xml).unwrap();
        let written = write_events(events.iter()).unwrap();
        let reparsed = read_events(&written).unwrap();
        assert_eq!(events.len(), reparsed.len());
    }

    #[test]
    fn attribute_values_parse_through_the_node_helper() {
        let events = read_events(br#"<c r="B2" s="3"/>"#).unwrap();
        let Event::Start(element) = &events[0] else {
            panic!("expected a start event");
        };
        assert_eq!(element.parse_attribute_value::<usize>("s").unwrap(), Some(3));
        assert_eq!(element.parse_attribute_value::<usize>("t").unwrap(), None);
        let error = element.parse_attribute_value::<usize>("r").unwrap_err();
        assert!(error.to_string().contains("'B2'"));
    }

    #[test]
    fn text_helper_resolves_references() {
        let xml = b"<t>x &#65; &lt; y</t>";
        let events = read_events(xml).unwrap();
        let mut text = String::new();
        for event in &events {
            match event {
                Event::Text(t) => text.push_bytes_text(t).unwrap(),
                Event::GeneralRef(r) => text.push_bytes_ref(r).unwrap(),
                _ => (),
            }
        }
        assert_eq!(text, "x A < y");
    }
}
