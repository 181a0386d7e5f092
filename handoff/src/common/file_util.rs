use crate::errors::HandoffResult;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn ensure_parent(path: &Path) -> HandoffResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Writes `contents` into a temporary file next to `path`, so persisting it stays on one
/// filesystem. The file is removed when dropped without being persisted.
fn write_temp(path: &Path, contents: &[u8]) -> HandoffResult<NamedTempFile> {
    ensure_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Replaces `path` with `contents`; readers never observe a partially written file.
pub(crate) fn write_replacing(path: &Path, contents: &[u8]) -> HandoffResult<()> {
    write_temp(path, contents)?
        .persist(path)
        .map_err(io::Error::from)?;
    Ok(())
}

/// Creates `path` with `contents` only if it does not exist yet.
///
/// Returns `false` when another writer got there first. The content becomes visible in one
/// step, so a reader either sees no file or the complete file.
pub(crate) fn write_exclusive(path: &Path, contents: &[u8]) -> HandoffResult<bool> {
    match write_temp(path, contents)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

/// Appends `line` and a newline to `path`, creating the file if needed.
pub(crate) fn append_line(path: &Path, line: &str) -> HandoffResult<()> {
    ensure_parent(path)?;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');
    file.write_all(record.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// Reads a text file, treating absence as `None`.
pub(crate) fn read_if_exists(path: &Path) -> HandoffResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads a file's raw bytes, treating absence as `None`.
pub(crate) fn read_bytes_if_exists(path: &Path) -> HandoffResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes a file, treating absence as success. Returns whether a file was removed.
pub(crate) fn remove_if_exists(path: &Path) -> HandoffResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_replacing_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        write_replacing(&path, b"one").unwrap();
        write_replacing(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn test_write_replacing_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("a.txt");
        write_replacing(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_exclusive_first_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcome.json");
        assert!(write_exclusive(&path, b"first").unwrap());
        assert!(!write_exclusive(&path, b"second").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn test_write_exclusive_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcome.json");
        write_exclusive(&path, b"first").unwrap();
        write_exclusive(&path, b"second").unwrap();
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_failed_replace_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("inside"), "x").unwrap();

        assert!(write_replacing(&path, b"value").is_err());
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("occupied")]);
    }

    #[test]
    fn test_read_if_exists_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_if_exists(&dir.path().join("missing")).unwrap().is_none());
    }

    #[test]
    fn test_read_bytes_if_exists_keeps_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        fs::write(&path, [0xff, 0x00, 0xfe]).unwrap();
        assert_eq!(read_bytes_if_exists(&path).unwrap(), Some(vec![0xff, 0x00, 0xfe]));
        assert!(read_bytes_if_exists(&dir.path().join("missing")).unwrap().is_none());
    }

    #[test]
    fn test_append_line_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows").join("t.jsonl");
        append_line(&path, "one").unwrap();
        append_line(&path, "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!remove_if_exists(&path).unwrap());
    }
}
