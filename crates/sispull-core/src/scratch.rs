//! Stream-path materialization and temp-file lifecycle.
//!
//! Large data sets arrive as one chunked response instead of discrete pages.
//! The bytes are spooled to `{entity}.json.tmp`, then the scratch file is
//! memory-mapped and scanned for flat record objects, which are converted to
//! the same tab-delimited layout as the page path. `review_temporary_file`
//! promotes `{entity}.txt.tmp` over the previous final file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indicatif::ProgressBar;
use memmap2::Mmap;
use serde_json::Value;

use crate::flatfile::record_to_line;

/// Fixed transfer chunk size (8 KiB)
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Log the running chunk index every this many chunks
const CHUNK_LOG_INTERVAL: usize = 5000;

/// Flat `{"key": "value", ...}` object led by a list delimiter. The regex
/// crate has no lookaround, so the leading delimiter is consumed outside the
/// capture group and the trailing delimiter is checked against the byte
/// after the match.
static RECORD_RE: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(r#"[,\[](\{"[A-Za-z0-9_-]+":\s?".*?"\})"#).unwrap()
});

pub fn scratch_path(dir: &Path, entity: &str) -> PathBuf {
    dir.join(format!("{entity}.json.tmp"))
}

pub fn text_tmp_path(dir: &Path, entity: &str) -> PathBuf {
    dir.join(format!("{entity}.txt.tmp"))
}

pub fn final_path(dir: &Path, entity: &str) -> PathBuf {
    dir.join(format!("{entity}.txt"))
}

/// Spool a streamed body into the entity's scratch file in fixed-size
/// chunks. Returns the number of chunks written.
pub fn stream_to_scratch(
    reader: &mut impl Read,
    path: &Path,
    pb: &ProgressBar,
) -> io::Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut chunks = 0usize;
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        chunks += 1;
        written += n as u64;
        if chunks % CHUNK_LOG_INTERVAL == 0 {
            log::debug!("chunks: {chunks}");
        }
        pb.set_position(written);
    }
    out.flush()?;
    log::debug!("stream complete after {chunks} chunks ({written} bytes)");
    Ok(chunks)
}

/// Scan the entity's scratch file for record objects and convert them to the
/// tab-delimited temp file. Per-record parse failures are logged and
/// skipped; zero boundary matches is a warning, not an error. Returns the
/// number of records written.
pub fn scratch_to_txt(headers: &[String], entity: &str, dir: &Path) -> io::Result<usize> {
    let scratch = scratch_path(dir, entity);
    let file = File::open(&scratch)?;
    if file.metadata()?.len() == 0 {
        log::warn!("{}: scratch file is empty", scratch.display());
        return Ok(0);
    }

    let mmap = unsafe { Mmap::map(&file)? };
    log::debug!("{}: mapped {} bytes", scratch.display(), mmap.len());

    let lower_headers: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let mut out: Option<BufWriter<File>> = None;
    let mut records = 0usize;
    let mut skipped = 0usize;

    for caps in RECORD_RE.captures_iter(&mmap) {
        let Some(found) = caps.get(1) else { continue };
        // A record must also be followed by a list delimiter
        if !matches!(mmap.get(found.end()).copied(), Some(b',' | b']')) {
            continue;
        }

        let record: Value = match serde_json::from_slice(found.as_bytes()) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("{entity}: skipping unparseable record: {err}");
                skipped += 1;
                continue;
            }
        };
        let Some(map) = record.as_object() else {
            skipped += 1;
            continue;
        };

        if out.is_none() {
            let mut w = BufWriter::new(File::create(text_tmp_path(dir, entity))?);
            writeln!(w, "{}", headers.join("\t"))?;
            out = Some(w);
        }
        if let Some(writer) = out.as_mut() {
            writer.write_all(record_to_line(map, &lower_headers).as_bytes())?;
            records += 1;
        }
    }

    match out {
        Some(mut w) => {
            w.flush()?;
            log::debug!("{entity}: {records} records converted, {skipped} skipped");
        }
        None => log::warn!("{entity}: no record boundaries found in scratch file"),
    }
    Ok(records)
}

/// Delete a file if it exists. Returns true when the file is absent after
/// the call, false when it still remains.
pub fn check_and_delete(path: &Path) -> bool {
    if !path.exists() {
        log::debug!("file {} does not exist", path.display());
        return true;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("file {} deleted", path.display());
            true
        }
        Err(err) => {
            log::warn!("file {} was not deleted: {err}", path.display());
            false
        }
    }
}

/// Promote the entity's temp text file over the previous final file.
///
/// The scratch file is deleted if present. When no `.txt.tmp` exists
/// (upstream errors prevented any writes) the prior `.txt` is left
/// completely unchanged and only a warning is logged. Returns the previous
/// and new file sizes as strings ("Unknown" when no prior file existed).
pub fn review_temporary_file(entity: &str, dir: &Path) -> (String, String) {
    check_and_delete(&scratch_path(dir, entity));

    let tmp = text_tmp_path(dir, entity);
    let txt = final_path(dir, entity);
    if !tmp.exists() {
        log::warn!(
            "{} not found, leaving {} unchanged",
            tmp.display(),
            txt.display()
        );
        return (String::new(), String::new());
    }

    let ori_size = txt
        .metadata()
        .map(|m| m.len().to_string())
        .unwrap_or_else(|_| "Unknown".to_string());
    let new_size = tmp.metadata().map(|m| m.len().to_string()).unwrap_or_default();
    log::debug!("{entity}: original file size: {ori_size}; generated file size: {new_size}");

    if let Err(err) = fs::rename(&tmp, &txt) {
        log::warn!("could not promote {}: {err}", tmp.display());
        return (ori_size, String::new());
    }
    (ori_size, new_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn headers() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn stream_writes_fixed_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("student.json.tmp");
        let data = vec![b'x'; CHUNK_SIZE * 2 + 100];
        let mut reader = Cursor::new(data.clone());

        let chunks = stream_to_scratch(&mut reader, &path, &ProgressBar::hidden()).unwrap();
        assert_eq!(chunks, 3);
        assert_eq!(fs::read(&path).unwrap(), data);
    }

    #[test]
    fn scan_converts_flat_records() {
        let dir = TempDir::new().unwrap();
        fs::write(
            scratch_path(dir.path(), "student"),
            br#"{"name": "q", "record": [{"a": "1", "b": "2"},{"a": "3"}]}"#,
        )
        .unwrap();

        let count = scratch_to_txt(&headers(), "student", dir.path()).unwrap();
        assert_eq!(count, 2);
        let content = fs::read_to_string(text_tmp_path(dir.path(), "student")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["A\tB", "1\t2", "3\t"]);
    }

    #[test]
    fn scan_skips_unparseable_records() {
        let dir = TempDir::new().unwrap();
        // Second object matches the boundary pattern but is invalid JSON
        fs::write(
            scratch_path(dir.path(), "student"),
            br#"[{"a": "1"},{"a": "x" "b": "y"},{"a": "2"}]"#,
        )
        .unwrap();

        let count = scratch_to_txt(&headers(), "student", dir.path()).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn scan_without_matches_creates_no_file() {
        let dir = TempDir::new().unwrap();
        fs::write(scratch_path(dir.path(), "student"), br#"{"message": 42}"#).unwrap();

        let count = scratch_to_txt(&headers(), "student", dir.path()).unwrap();
        assert_eq!(count, 0);
        assert!(!text_tmp_path(dir.path(), "student").exists());
    }

    #[test]
    fn scan_of_empty_scratch_is_zero_records() {
        let dir = TempDir::new().unwrap();
        fs::write(scratch_path(dir.path(), "student"), b"").unwrap();
        assert_eq!(scratch_to_txt(&headers(), "student", dir.path()).unwrap(), 0);
    }

    #[test]
    fn check_and_delete_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(check_and_delete(&dir.path().join("absent.tmp")));
    }

    #[test]
    fn check_and_delete_removes_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stale.tmp");
        fs::write(&path, b"stale").unwrap();
        assert!(check_and_delete(&path));
        assert!(!path.exists());
    }

    #[test]
    fn check_and_delete_reports_failure() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be removed with remove_file
        let path = dir.path().join("blocked.tmp");
        fs::create_dir(&path).unwrap();
        assert!(!check_and_delete(&path));
        assert!(path.exists());
    }

    #[test]
    fn review_promotes_tmp_over_final() {
        let dir = TempDir::new().unwrap();
        fs::write(final_path(dir.path(), "student"), b"old").unwrap();
        fs::write(text_tmp_path(dir.path(), "student"), b"new contents").unwrap();
        fs::write(scratch_path(dir.path(), "student"), b"scratch").unwrap();

        let (ori, new) = review_temporary_file("student", dir.path());
        assert_eq!(ori, "3");
        assert_eq!(new, "12");
        assert_eq!(fs::read(final_path(dir.path(), "student")).unwrap(), b"new contents");
        assert!(!text_tmp_path(dir.path(), "student").exists());
        assert!(!scratch_path(dir.path(), "student").exists());
    }

    #[test]
    fn review_reports_unknown_without_prior_final() {
        let dir = TempDir::new().unwrap();
        fs::write(text_tmp_path(dir.path(), "student"), b"new").unwrap();

        let (ori, new) = review_temporary_file("student", dir.path());
        assert_eq!(ori, "Unknown");
        assert_eq!(new, "3");
    }

    #[test]
    fn review_without_tmp_leaves_final_untouched() {
        let dir = TempDir::new().unwrap();
        fs::write(final_path(dir.path(), "student"), b"keep me").unwrap();

        let (ori, new) = review_temporary_file("student", dir.path());
        assert!(ori.is_empty());
        assert!(new.is_empty());
        assert_eq!(fs::read(final_path(dir.path(), "student")).unwrap(), b"keep me");
    }
}
