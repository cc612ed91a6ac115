//! Placeholder substitution over document parts. Every part is handled as an
//! event sequence: paragraphs are located, their text nodes collected, and the
//! changed nodes are patched back without disturbing the rest of the part.
//!
//! A paragraph is processed as a whole so a placeholder split across runs is
//! still found. When every occurrence sits inside a single text node the node
//! is replaced in place and the other runs keep their formatting; otherwise
//! the merged paragraph text lands in the first text node and the remaining
//! nodes are emptied.

use crate::docx::package::Package;
use crate::error::RingdocError;
use crate::helpers::text::needs_space_preserve;
use crate::helpers::xml::read_events;
use crate::helpers::xml::write_events;
use crate::helpers::xml::XmlTextContextHelper;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::collections::HashSet;

// WordprocessingML names are matched with their prefix so DrawingML elements
// such as `a:p` never count as paragraphs.
const TAG_PARAGRAPH: QName = QName(b"w:p");
const TAG_TEXT: QName = QName(b"w:t");
const TAG_TABLE: QName = QName(b"w:tbl");

/// An innermost paragraph's extent in a part's event sequence. Paragraphs
/// nested in text boxes show up as their own spans; the wrapping paragraph
/// does not.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParagraphSpan {
    /// Index of the paragraph's start event
    pub(crate) start: usize,
    /// Index of the paragraph's end event
    pub(crate) end: usize,
    /// Whether the paragraph sits inside a table
    pub(crate) in_table: bool,
}

/// One `w:t` node: where it starts, which events carry its text, and the
/// resolved text itself.
#[derive(Debug, Clone)]
pub(crate) struct TextSlot {
    /// Index of the node's start event
    pub(crate) start: usize,
    /// Indexes of the text, CDATA, and entity events inside the node
    pub(crate) text_events: Vec<usize>,
    /// Resolved text content
    pub(crate) content: String,
}

/// Accumulated edits against an event sequence, applied in one pass.
#[derive(Debug, Default)]
pub(crate) struct Patch {
    /// Event index replaced by a new sequence
    pub(crate) replaced: HashMap<usize, Vec<Event<'static>>>,
    /// Event indexes removed entirely
    pub(crate) dropped: HashSet<usize>,
    /// Sequences spliced in after an event index
    pub(crate) inserted_after: HashMap<usize, Vec<Event<'static>>>,
}

/// Serializes the events with the patch applied.
pub(crate) fn apply_patch(events: &[Event], patch: &Patch) -> Result<Vec<u8>, RingdocError> {
    let mut output: Vec<&Event> = Vec::with_capacity(events.len() + 8);
    for (index, event) in events.iter().enumerate() {
        if !patch.dropped.contains(&index) {
            match patch.replaced.get(&index) {
                Some(sequence) => output.extend(sequence.iter()),
                None => output.push(event),
            }
        }
        if let Some(sequence) = patch.inserted_after.get(&index) {
            output.extend(sequence.iter());
        }
    }
    write_events(output)
}

/// Finds every innermost paragraph, in document order.
pub(crate) fn paragraph_spans(events: &[Event]) -> Vec<ParagraphSpan> {
    let mut spans = Vec::new();
    let mut stack: Vec<(usize, bool, bool)> = Vec::new();
    let mut table_depth = 0usize;
    for (index, event) in events.iter().enumerate() {
        match event {
            Event::Start(element) if element.name() == TAG_TABLE => table_depth += 1,
            Event::End(element) if element.name() == TAG_TABLE => table_depth = table_depth.saturating_sub(1),
            Event::Start(element) if element.name() == TAG_PARAGRAPH => {
                if let Some((_, has_nested, _)) = stack.last_mut() {
                    *has_nested = true;
                }
                stack.push((index, false, table_depth > 0));
            }
            Event::End(element) if element.name() == TAG_PARAGRAPH => {
                if let Some((start, has_nested, in_table)) = stack.pop() {
                    if !has_nested {
                        spans.push(ParagraphSpan { start, end: index, in_table });
                    }
                }
            }
            _ => (),
        }
    }
    spans.sort_by_key(|span| span.start);
    spans
}

/// Collects the text nodes of one paragraph span.
pub(crate) fn text_slots(events: &[Event], span: &ParagraphSpan) -> Result<Vec<TextSlot>, RingdocError> {
    let mut slots = Vec::new();
    let mut open: Option<TextSlot> = None;
    for index in span.start..=span.end {
        match &events[index] {
            Event::Start(element) if element.name() == TAG_TEXT => {
                open = Some(TextSlot {
                    start: index,
                    text_events: Vec::new(),
                    content: String::new(),
                });
            }
            Event::End(element) if element.name() == TAG_TEXT => {
                if let Some(slot) = open.take() {
                    slots.push(slot);
                }
            }
            Event::Text(text) => {
                if let Some(slot) = open.as_mut() {
                    slot.text_events.push(index);
                    slot.content.push_bytes_text(text)?;
                }
            }
            Event::GeneralRef(reference) => {
                if let Some(slot) = open.as_mut() {
                    slot.text_events.push(index);
                    slot.content.push_bytes_ref(reference)?;
                }
            }
            Event::CData(data) => {
                if let Some(slot) = open.as_mut() {
                    slot.text_events.push(index);
                    slot.content.push_str(&data.xml_content()?);
                }
            }
            _ => (),
        }
    }
    Ok(slots)
}

/// Finds the first element with the given tag inside the index range.
pub(crate) fn find_element(events: &[Event], start: usize, end: usize, tag: QName) -> Option<(usize, usize)> {
    if events.is_empty() {
        return None;
    }
    let mut open = None;
    for index in start..=end.min(events.len() - 1) {
        match &events[index] {
            Event::Start(element) if element.name() == tag && open.is_none() => open = Some(index),
            Event::End(element) if element.name() == tag => {
                if let Some(open) = open {
                    return Some((open, index));
                }
            }
            _ => (),
        }
    }
    None
}

/// Collects the readable text in an event range: runs concatenated within a
/// paragraph, paragraphs joined by newlines.
pub(crate) fn text_between(events: &[Event], start: usize, end: usize) -> Result<String, RingdocError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut in_text = false;
    for event in &events[start..=end] {
        match event {
            Event::Start(element) if element.name() == TAG_PARAGRAPH => paragraphs.push(String::new()),
            Event::Start(element) if element.name() == TAG_TEXT => in_text = true,
            Event::End(element) if element.name() == TAG_TEXT => in_text = false,
            Event::Text(text) if in_text => {
                if paragraphs.is_empty() {
                    paragraphs.push(String::new());
                }
                if let Some(last) = paragraphs.last_mut() {
                    last.push_bytes_text(text)?;
                }
            }
            Event::GeneralRef(reference) if in_text => {
                if paragraphs.is_empty() {
                    paragraphs.push(String::new());
                }
                if let Some(last) = paragraphs.last_mut() {
                    last.push_bytes_ref(reference)?;
                }
            }
            Event::CData(data) if in_text => {
                if paragraphs.is_empty() {
                    paragraphs.push(String::new());
                }
                if let Some(last) = paragraphs.last_mut() {
                    last.push_str(&data.xml_content()?);
                }
            }
            _ => (),
        }
    }
    Ok(paragraphs.join("\n"))
}

/// Replaces every occurrence of a placeholder across the document's text
/// parts and returns how many occurrences were replaced.
pub(crate) fn substitute(package: &mut Package, placeholder: &str, replacement: &str) -> Result<usize, RingdocError> {
    if placeholder.is_empty() {
        return Ok(0);
    }
    let mut total = 0usize;
    for part_name in package.text_part_names() {
        let bytes = match package.part(&part_name) {
            Some(bytes) => bytes,
            None => continue,
        };
        let events = read_events(bytes)?;
        let mut patch = Patch::default();
        let mut count = 0usize;
        for span in paragraph_spans(&events) {
            count += replace_in_paragraph(&events, &span, placeholder, replacement, &mut patch)?;
        }
        if count > 0 {
            log::debug!("Replaced {} occurrence(s) of {} in {}", count, placeholder, part_name);
            let bytes = apply_patch(&events, &patch)?;
            package.set_part(&part_name, bytes);
            total += count;
        }
    }
    Ok(total)
}

fn replace_in_paragraph(
    events: &[Event<'static>],
    span: &ParagraphSpan,
    placeholder: &str,
    replacement: &str,
    patch: &mut Patch,
) -> Result<usize, RingdocError> {
    let slots = text_slots(events, span)?;
    let full: String = slots.iter().map(|slot| slot.content.as_str()).collect();
    let total = full.matches(placeholder).count();
    if total == 0 {
        return Ok(0);
    }

    let intra: usize = slots.iter().map(|slot| slot.content.matches(placeholder).count()).sum();
    if intra == total {
        // Every occurrence sits inside a single text node; replace in place so
        // the other runs keep their formatting.
        for slot in &slots {
            if slot.content.contains(placeholder) {
                rewrite_slot(events, slot, &slot.content.replace(placeholder, replacement), patch)?;
            }
        }
    } else {
        // Split across runs: the first text node takes the merged paragraph
        // text and the rest are emptied.
        let merged = full.replace(placeholder, replacement);
        rewrite_slot(events, &slots[0], &merged, patch)?;
        for slot in &slots[1..] {
            rewrite_slot(events, slot, "", patch)?;
        }
    }
    Ok(total)
}

/// Points a text node at new content. Multi-line content closes and reopens
/// the node around explicit breaks; significant edge whitespace gets an
/// `xml:space` marker.
fn rewrite_slot(
    events: &[Event<'static>],
    slot: &TextSlot,
    new_text: &str,
    patch: &mut Patch,
) -> Result<(), RingdocError> {
    let first_line = new_text.split('\n').next().unwrap_or("");
    if needs_space_preserve(first_line) {
        if let Event::Start(start) = &events[slot.start] {
            if start.try_get_attribute("xml:space")?.is_none() {
                let mut patched = start.clone();
                patched.push_attribute(("xml:space", "preserve"));
                patch.replaced.insert(slot.start, vec![Event::Start(patched)]);
            }
        }
    }

    let sequence = run_text_events(new_text);
    match slot.text_events.split_first() {
        Some((first, rest)) => {
            patch.replaced.insert(*first, sequence);
            for index in rest {
                patch.dropped.insert(*index);
            }
        }
        None => {
            if !sequence.is_empty() {
                patch.inserted_after.insert(slot.start, sequence);
            }
        }
    }
    Ok(())
}

/// Renders replacement text as run content. Newlines become `w:br` elements
/// between reopened text nodes, the way word processors store line breaks.
pub(crate) fn run_text_events(text: &str) -> Vec<Event<'static>> {
    let mut events = Vec::new();
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            events.push(Event::End(BytesEnd::new("w:t")));
            events.push(Event::Empty(BytesStart::new("w:br")));
            let mut reopened = BytesStart::new("w:t");
            if needs_space_preserve(line) {
                reopened.push_attribute(("xml:space", "preserve"));
            }
            events.push(Event::Start(reopened));
        }
        if !line.is_empty() {
            events.push(Event::Text(BytesText::new(line).into_owned()));
        }
    }
    events
}
