//! Post-generation size control. Documents above the configured threshold are
//! rewritten entry by entry at maximum deflate level into a sibling temp file,
//! which replaces the original only when it actually came out smaller.

use crate::error::RingdocError;
use crate::error::ResultMessage;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

/// Recompresses an archive when it exceeds the threshold. Returns whether the
/// file was replaced by a smaller one.
pub(crate) fn shrink_if_oversize(path: &Path, threshold: u64) -> Result<bool, RingdocError> {
    let prefix = format!("Cannot compress '{}'", path.display());
    let size = fs::metadata(path).map_err(RingdocError::IoError).with_prefix(&prefix)?.len();
    if size <= threshold {
        return Ok(false);
    }

    let file = File::open(path).map_err(RingdocError::IoError).with_prefix(&prefix)?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(RingdocError::ZipError).with_prefix(&prefix)?;

    let directory = path.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(directory).map_err(RingdocError::IoError).with_prefix(&prefix)?;
    let mut writer = ZipWriter::new(temp.as_file());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(RingdocError::ZipError).with_prefix(&prefix)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_owned();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes).map_err(RingdocError::IoError).with_prefix(&prefix)?;
        writer.start_file(name, options).map_err(RingdocError::ZipError).with_prefix(&prefix)?;
        writer.write_all(&bytes).map_err(RingdocError::IoError).with_prefix(&prefix)?;
    }
    writer.finish().map_err(RingdocError::ZipError).with_prefix(&prefix)?;

    let new_size = temp.as_file().metadata().map_err(RingdocError::IoError).with_prefix(&prefix)?.len();
    if new_size < size {
        temp.persist(path).map_err(RingdocError::TempFileError).with_prefix(&prefix)?;
        Ok(true)
    } else {
        Ok(false)
    }
}
