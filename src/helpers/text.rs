//! Text normalization utilities for grouping keys, output file names, and cell values.

use regex::Regex;
use std::sync::OnceLock;

/// Characters Windows refuses in file names
const FILE_NAME_PATTERN: &str = r#"[\\/*?:"<>|]"#;

fn whitespace_regex() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn file_name_regex() -> &'static Regex {
    static FILE_NAME: OnceLock<Regex> = OnceLock::new();
    FILE_NAME.get_or_init(|| Regex::new(FILE_NAME_PATTERN).expect("file name regex"))
}

/// Trims a value and collapses internal whitespace runs to a single space.
/// Grouping keys entered by hand frequently carry stray double spaces that
/// would otherwise split one logical group into several.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    whitespace_regex().replace_all(value.trim(), " ").into_owned()
}

/// Strips filesystem-unsafe characters from an output file name.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    file_name_regex().replace_all(name, "").into_owned()
}

/// Maps the literal missing-value token "nan" to an empty string.
/// Text coercion of spreadsheet data surfaces missing cells as that token.
pub(crate) fn blank_if_nan(value: &str) -> &str {
    if value.eq_ignore_ascii_case("nan") {
        ""
    } else {
        value
    }
}

/// Escapes the five XML special characters for text and attribute content.
pub(crate) fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(character),
        }
    }
    escaped
}

/// Word drops edge whitespace in `w:t` nodes unless `xml:space="preserve"` is set.
pub(crate) fn needs_space_preserve(value: &str) -> bool {
    value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) || value.contains('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_normalizes_runs() {
        assert_eq!(collapse_whitespace("  Ring  A "), "Ring A");
        assert_eq!(collapse_whitespace("Ring\t\tB"), "Ring B");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn collapse_whitespace_is_idempotent() {
        let once = collapse_whitespace("  Jabo   Ring\u{a0} 35 ");
        assert_eq!(collapse_whitespace(&once), once);
    }

    #[test]
    fn sanitize_file_name_strips_reserved_characters() {
        assert_eq!(sanitize_file_name(r#"MW/IP: "Ring 1"?"#), "MWIP Ring 1");
        assert_eq!(sanitize_file_name("plain name"), "plain name");
    }

    #[test]
    fn blank_if_nan_guards_missing_markers() {
        assert_eq!(blank_if_nan("nan"), "");
        assert_eq!(blank_if_nan("NaN"), "");
        assert_eq!(blank_if_nan("nanometer"), "nanometer");
        assert_eq!(blank_if_nan("value"), "value");
    }

    #[test]
    fn escape_xml_covers_special_characters() {
        assert_eq!(escape_xml(r#"a<b&c>"d'"#), "a&lt;b&amp;c&gt;&quot;d&apos;");
    }

    #[test]
    fn space_preserve_detection() {
        assert!(needs_space_preserve(" x"));
        assert!(needs_space_preserve("x "));
        assert!(needs_space_preserve("a\nb"));
        assert!(!needs_space_preserve("a b"));
    }
}
