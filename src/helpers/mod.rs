//! Shared low-level utilities: XML event streaming, ZIP access, and text normalization.
pub(crate) mod text;
pub(crate) mod xml;
pub(crate) mod zip;
