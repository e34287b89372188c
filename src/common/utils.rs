//! Utility functions for chunkfs

use std::path::Path;

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Available space on the filesystem holding `path`
pub fn available_disk_space(path: &Path) -> crate::Result<u64> {
    Ok(fs2::available_space(path)?)
}

/// Number of chunks for a file of `size` bytes split at `chunk_size`
pub fn chunk_count(size: u64, chunk_size: u32) -> u64 {
    if size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size as u64)
}

/// On-disk name of a chunk file: `<filename>_<index>`
pub fn chunk_file_name(filename: &str, chunk: u32) -> String {
    format!("{}_{}", filename, chunk)
}

/// Parse a chunk file name back into `(filename, index)`.
///
/// The index is everything after the last `_`, so file names containing
/// underscores stay unambiguous.
pub fn parse_chunk_file_name(name: &str) -> Option<(String, u32)> {
    let (filename, idx) = name.rsplit_once('_')?;
    if filename.is_empty() {
        return None;
    }
    let chunk = idx.parse().ok()?;
    Some((filename.to_string(), chunk))
}

/// Validate a file name for catalog and on-disk use.
///
/// Names become path components on storage servers, so anything that could
/// escape the data directory is rejected.
pub fn validate_filename(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::Validation("file name cannot be empty".into()));
    }
    if name.len() > 255 {
        return Err(crate::Error::Validation(
            "file name too long (max 255 bytes)".into(),
        ));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(crate::Error::Validation(format!(
            "file name {:?} contains path separators",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(crate::Error::Validation(format!(
            "file name {:?} is not allowed",
            name
        )));
    }
    Ok(())
}
