//! DOCX template engine. A document is opened as a flat list of package parts;
//! the text, table, and image modules rewrite individual parts as XML event
//! sequences and the package serializes everything back into a valid archive.

pub(crate) mod image;
pub(crate) mod package;
pub(crate) mod table;
pub(crate) mod text;

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum DocxError {
    #[error("Document '{0}' is missing part '{1}'")]
    MissingPartError(String, String),

    #[error("Unsupported image format '{0}'")]
    UnsupportedImageError(String),
}
