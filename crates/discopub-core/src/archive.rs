//! Batch output on disk: the unfetched manifest and the zip of everything.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;

use crate::{BatchReport, CoreError, MANIFEST_FILE_NAME};

/// Write `unfetched_pmids.tsv` (one identifier per line) into `dir`.
///
/// When every identifier was saved no manifest is written, and one left
/// behind by an earlier batch in the same directory is removed. Returns the
/// path when a manifest was produced.
pub fn write_manifest(dir: &Path, report: &BatchReport) -> std::io::Result<Option<PathBuf>> {
    let path = dir.join(MANIFEST_FILE_NAME);
    if report.unfetched.is_empty() {
        return match std::fs::remove_file(&path) {
            Ok(()) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        };
    }
    let mut content = String::new();
    for entry in &report.unfetched {
        content.push_str(entry.pmid.as_str());
        content.push('\n');
    }
    std::fs::write(&path, content)?;
    Ok(Some(path))
}

/// Zip every regular file directly inside `dir`, flat, sorted by name.
pub fn package_directory(dir: &Path) -> Result<Vec<u8>, CoreError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for path in entries {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        let data = std::fs::read(&path)?;
        writer.start_file(name, options)?;
        writer.write_all(&data)?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}
