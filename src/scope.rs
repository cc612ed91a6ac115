//! Scope registry. A scope binds a document template to the spreadsheet
//! layout it expects: sheet name, key columns, the table keyword, and the
//! column mapping for the materialized table. Scopes and tool settings are
//! kept together in one JSON configuration file.

use crate::error::RingdocError;
use crate::error::ResultMessage;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum ScopeError {
    #[error("Scope '{0}' is not configured; available scopes: {1}")]
    UnknownScopeError(String, String),

    #[error("Template '{0}' does not exist")]
    MissingTemplateError(String),
}

/// Configuration of one document scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ScopeConfig {
    /// Template file name inside the templates folder
    pub(crate) template_file: String,
    /// Worksheet holding the report rows
    pub(crate) excel_sheet: String,
    /// Keyword a header must contain for it to mark the placeholder table
    pub(crate) table_keyword: String,
    /// Column holding the document title
    pub(crate) title_col: String,
    /// Column holding the ring key rows are grouped by
    pub(crate) ring_col: String,
    /// Spreadsheet columns materialized into the table, in cell order
    #[serde(default)]
    pub(crate) columns_mapping: Vec<String>,
    /// Column substituted for the region placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) region_col: Option<String>,
    /// Column overriding the ring value for the 1-2-1 placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) ring_121_col: Option<String>,
    /// Column tallied into the device summary placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) device_summary_col: Option<String>,
    /// Whether documents of this scope embed a topology image
    #[serde(default)]
    pub(crate) has_topology_image: bool,
}

/// Tool-wide settings stored next to the scopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Settings {
    #[serde(default = "default_output_folder")]
    pub(crate) output_folder: String,
    #[serde(default = "default_templates_folder")]
    pub(crate) templates_folder: String,
    /// Documents above this size get recompressed after generation
    #[serde(default = "default_compress_threshold_mb")]
    pub(crate) compress_threshold_mb: u64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            output_folder: default_output_folder(),
            templates_folder: default_templates_folder(),
            compress_threshold_mb: default_compress_threshold_mb(),
        }
    }
}

impl Settings {
    /// Resolves a template file name against the templates folder.
    pub(crate) fn template_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.templates_folder).join(file_name)
    }
}

fn default_output_folder() -> String {
    "output".to_owned()
}

fn default_templates_folder() -> String {
    "templates_store".to_owned()
}

fn default_compress_threshold_mb() -> u64 {
    1
}

/// The whole configuration file: named scopes plus settings.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Registry {
    #[serde(default)]
    pub(crate) scopes: BTreeMap<String, ScopeConfig>,
    #[serde(default)]
    pub(crate) settings: Settings,
}

impl Registry {
    /// Loads the registry; a missing file yields an empty registry with
    /// default settings.
    pub(crate) fn load(path: &Path) -> Result<Registry, RingdocError> {
        if !path.exists() {
            return Ok(Registry::default());
        }
        let prefix = format!("Cannot read configuration '{}'", path.display());
        let text = fs::read_to_string(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        let registry = serde_json::from_str(&text).map_err(RingdocError::JsonError).with_prefix(&prefix)?;
        Ok(registry)
    }

    /// Writes the registry as pretty-printed JSON.
    pub(crate) fn save(&self, path: &Path) -> Result<(), RingdocError> {
        let prefix = format!("Cannot write configuration '{}'", path.display());
        let text = serde_json::to_string_pretty(self).map_err(RingdocError::JsonError).with_prefix(&prefix)?;
        fs::write(path, text).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        Ok(())
    }

    /// Looks a scope up by name.
    pub(crate) fn scope(&self, name: &str) -> Result<&ScopeConfig, RingdocError> {
        self.scopes.get(name).ok_or_else(|| {
            let available = self.scopes.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
            RingdocError::ScopeError(ScopeError::UnknownScopeError(name.to_owned(), available))
        })
    }
}

/// Lists the template files in a folder, sorted by name.
pub(crate) fn list_templates(folder: &Path) -> Result<Vec<String>, RingdocError> {
    let pattern = folder.join("*.docx");
    let mut names = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let path = entry?;
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scope() -> ScopeConfig {
        ScopeConfig {
            template_file: "metro.docx".to_owned(),
            excel_sheet: "Sheet1".to_owned(),
            table_keyword: "NE Name".to_owned(),
            title_col: "Title".to_owned(),
            ring_col: "Ring".to_owned(),
            columns_mapping: vec!["NE Name".to_owned(), "NE Type".to_owned()],
            region_col: Some("Region".to_owned()),
            ring_121_col: None,
            device_summary_col: Some("NE Type".to_owned()),
            has_topology_image: true,
        }
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(&dir.path().join("config.json")).unwrap();
        assert!(registry.scopes.is_empty());
        assert_eq!(registry.settings.output_folder, "output");
        assert_eq!(registry.settings.templates_folder, "templates_store");
        assert_eq!(registry.settings.compress_threshold_mb, 1);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut registry = Registry::default();
        registry.scopes.insert("metro".to_owned(), sample_scope());
        registry.save(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        let scope = loaded.scope("metro").unwrap();
        assert_eq!(scope.template_file, "metro.docx");
        assert_eq!(scope.columns_mapping, vec!["NE Name", "NE Type"]);
        assert!(scope.has_topology_image);
        assert_eq!(scope.ring_121_col, None);
    }

    #[test]
    fn sparse_scope_json_fills_defaults() {
        let text = r#"{
            "scopes": {
                "metro": {
                    "template_file": "metro.docx",
                    "excel_sheet": "Sheet1",
                    "table_keyword": "NE Name",
                    "title_col": "Title",
                    "ring_col": "Ring"
                }
            }
        }"#;
        let registry: Registry = serde_json::from_str(text).unwrap();
        let scope = registry.scope("metro").unwrap();
        assert!(scope.columns_mapping.is_empty());
        assert_eq!(scope.region_col, None);
        assert!(!scope.has_topology_image);
        assert_eq!(registry.settings.output_folder, "output");
    }

    #[test]
    fn unknown_scope_lists_available() {
        let mut registry = Registry::default();
        registry.scopes.insert("metro".to_owned(), sample_scope());
        registry.scopes.insert("backbone".to_owned(), sample_scope());
        let message = registry.scope("access").unwrap_err().to_string();
        assert!(message.contains("'access'"));
        assert!(message.contains("backbone, metro"));
    }

    #[test]
    fn templates_are_listed_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.docx"), b"x").unwrap();
        fs::write(dir.path().join("a.docx"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let names = list_templates(dir.path()).unwrap();
        assert_eq!(names, vec!["a.docx", "b.docx"]);
    }
}
