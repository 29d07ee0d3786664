//! Persisted index format and atomic save.
//!
//! ```text
//! # dintact index {"version":2,"algorithm":"xxh128"}
//! 5d41402abc4b2a76b9719d911017c592  5  2024-03-01T12:30:45.123456789Z  notes/hello.txt
//! ```
//!
//! One record per line: fingerprint, size, modification time and path,
//! separated by two spaces. The path comes last so it may contain spaces;
//! backslash, LF and CR are escaped. A missing file is an empty index; any
//! malformed line is fatal.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fingerprint::{Algorithm, Fingerprint};
use crate::index::record::{FileRecord, format_timestamp, parse_timestamp, validate_rel_path};
use crate::index::store::IndexStore;

/// Default index file name at the tree root.
pub const DEFAULT_INDEX_FILE: &str = "index.txt";

const HEADER_PREFIX: &str = "# dintact index ";
const FORMAT_VERSION: u32 = 2;
const SEPARATOR: &str = "  ";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    version: u32,
    algorithm: Algorithm,
}

/// Temporary sibling used while saving `path`.
#[must_use]
pub fn temp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary sibling (`<name>.tmp`)
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let temp = temp_path(path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }

    {
        let file = File::create(&temp).map_err(|e| Error::io_at(&temp, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(content.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| Error::io_at(&temp, e))?;
        // Sync to disk before rename
        writer.get_ref().sync_all().map_err(|e| Error::io_at(&temp, e))?;
    }

    fs::rename(&temp, path).map_err(|e| Error::io_at(path, e))?;

    Ok(())
}

/// Load the index stored at `index_path` for the tree at `root`.
///
/// A missing file yields an empty index using `default_algorithm`.
///
/// # Errors
///
/// Returns `IndexCorrupt` for any malformed content and `Io` if the file
/// exists but cannot be read.
pub fn load(index_path: &Path, root: &Path, default_algorithm: Algorithm) -> Result<IndexStore> {
    let content = match fs::read_to_string(index_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %index_path.display(), "No index yet, starting empty");
            return Ok(IndexStore::new(root, default_algorithm));
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(Error::IndexCorrupt {
                path: index_path.to_path_buf(),
                line: 0,
                message: "index is not valid UTF-8".to_string(),
            });
        }
        Err(e) => return Err(Error::io_at(index_path, e)),
    };
    let index = parse(&content, root).map_err(|(line, message)| Error::IndexCorrupt {
        path: index_path.to_path_buf(),
        line,
        message,
    })?;
    debug!(path = %index_path.display(), records = index.len(), "Index loaded");
    Ok(index)
}

/// Save `index` to `index_path` atomically.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save(index: &IndexStore, index_path: &Path) -> Result<()> {
    atomic_write(index_path, &serialize(index))?;
    debug!(path = %index_path.display(), records = index.len(), "Index saved");
    Ok(())
}

/// Render an index in its persisted form.
#[must_use]
pub fn serialize(index: &IndexStore) -> String {
    let header = Header {
        version: FORMAT_VERSION,
        algorithm: index.algorithm(),
    };
    // Serializing a two-field struct of plain values cannot fail.
    let meta = serde_json::to_string(&header).unwrap_or_default();
    let mut out = format!("{HEADER_PREFIX}{meta}\n");
    for record in index.iter() {
        out.push_str(record.fingerprint.as_str());
        out.push_str(SEPARATOR);
        out.push_str(&record.size.to_string());
        out.push_str(SEPARATOR);
        out.push_str(&format_timestamp(&record.modified));
        out.push_str(SEPARATOR);
        out.push_str(&escape_path(&record.path));
        out.push('\n');
    }
    out
}

/// Parse persisted content. Errors carry the 1-based line number.
fn parse(content: &str, root: &Path) -> std::result::Result<IndexStore, (usize, String)> {
    let mut lines = content.lines().enumerate();

    let header_line = lines
        .next()
        .map(|(_, l)| l)
        .ok_or((1, "index header missing".to_string()))?;
    let meta = header_line
        .strip_prefix(HEADER_PREFIX)
        .ok_or((1, "index header missing".to_string()))?;
    let header: Header =
        serde_json::from_str(meta).map_err(|e| (1, format!("invalid index header: {e}")))?;
    if header.version != FORMAT_VERSION {
        return Err((1, format!("unsupported index version {}", header.version)));
    }

    let mut index = IndexStore::new(root, header.algorithm);
    for (i, line) in lines {
        let line_no = i + 1;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let record = parse_record(line, header.algorithm).map_err(|m| (line_no, m))?;
        if index.contains(&record.path) {
            return Err((line_no, format!("duplicate path '{}'", record.path)));
        }
        index.insert(record);
    }
    Ok(index)
}

fn parse_record(line: &str, algorithm: Algorithm) -> std::result::Result<FileRecord, String> {
    let mut fields = line.splitn(4, SEPARATOR);
    let (Some(fp), Some(size), Some(modified), Some(path)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err("expected 4 fields".to_string());
    };

    let fingerprint = Fingerprint::parse(fp, algorithm)?;
    let size = size
        .parse::<u64>()
        .map_err(|e| format!("invalid size '{size}': {e}"))?;
    let modified = parse_timestamp(modified)?;
    let path = unescape_path(path)?;
    validate_rel_path(&path)?;

    Ok(FileRecord {
        path,
        size,
        modified,
        fingerprint,
    })
}

fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_path(s: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => return Err(format!("invalid escape '\\{}' in path", other.unwrap_or(' '))),
        }
    }
    Ok(out)
}
