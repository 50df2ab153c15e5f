//! Zip extraction and directory moves used by the download pipeline.
//!
//! Extraction resolves every entry through [`safe_child`], which rejects
//! entries that would escape the output directory via `..` or absolute
//! components (path traversal guard).

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while unpacking or moving extracted content.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Failed to create, read, or move a file or directory
    #[error("I/O error during extraction: {0}")]
    Io(#[from] io::Error),

    /// Archive is corrupted or not a zip file
    #[error("Corrupted archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An archive entry would escape the extraction root
    #[error("Path traversal attempt rejected: '{attempted}'")]
    PathTraversal { attempted: String },
}

/// Resolves `relative` against `root`, rejecting any path that escapes it.
///
/// # Errors
///
/// Returns `Err` if `relative` contains `..`, is absolute, or carries a
/// platform prefix.
pub fn safe_child(root: &Path, relative: &Path) -> Result<PathBuf, ExtractionError> {
    for component in relative.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::PathTraversal {
                    attempted: relative.display().to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(root.join(relative))
}

/// Extracts every entry of `zip_path` into `outdir`.
///
/// Returns the number of files written. When `delete_zip` is set the archive
/// is removed after a successful extraction.
pub fn extract_zip(zip_path: &Path, outdir: &Path, delete_zip: bool) -> Result<usize, ExtractionError> {
    info!(zip = %zip_path.display(), outdir = %outdir.display(), "Extracting archive");

    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(outdir)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let dest = safe_child(outdir, Path::new(entry.name()))?;

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    // Release the file handle before removing the archive.
    drop(archive);

    if delete_zip {
        debug!(zip = %zip_path.display(), "Deleting extracted archive");
        fs::remove_file(zip_path)?;
    }

    info!(files = written, "Extraction completed");
    Ok(written)
}

/// Returns `dir/name` if it is a directory, otherwise `dir` itself.
///
/// Archives are packed either with a top-level folder (`images/P0000.png`)
/// or flat (`P0000.png`).
pub fn content_root(dir: &Path, name: &str) -> PathBuf {
    let nested = dir.join(name);
    if nested.is_dir() {
        nested
    } else {
        dir.to_path_buf()
    }
}

/// Moves `src` to `dst`, merging into `dst` when it already exists.
///
/// Files in `dst` with the same relative path are overwritten. `src` no
/// longer exists afterwards.
pub fn move_dir(src: &Path, dst: &Path) -> Result<(), ExtractionError> {
    debug!(src = %src.display(), dst = %dst.display(), "Moving directory");

    if !dst.exists() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::rename(src, dst).is_ok() {
            return Ok(());
        }
    }

    merge_dir(src, dst)?;
    fs::remove_dir_all(src)?;
    Ok(())
}

fn merge_dir(src: &Path, dst: &Path) -> Result<(), ExtractionError> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            merge_dir(&from, &to)?;
        } else {
            move_file(&from, &to)?;
        }
    }

    Ok(())
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if to.is_file() {
        fs::remove_file(to)?;
    }
    // Rename fails across filesystems; fall back to copy + remove.
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Writes a zip at `path` holding `entries` of `(name, contents)`.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, contents) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_safe_child_rejects_path_traversal() {
        let root = Path::new("/tmp/safe_root");

        // Parent-dir traversal
        assert!(safe_child(root, Path::new("../../etc/passwd")).is_err());
        // Absolute path
        assert!(safe_child(root, Path::new("/etc/passwd")).is_err());
        // Normal relative path is allowed
        assert_eq!(
            safe_child(root, Path::new("labelTxt/P0000.txt")).unwrap(),
            root.join("labelTxt/P0000.txt")
        );
    }

    #[test]
    fn test_extract_zip_writes_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("labelTxt.zip");
        write_zip(
            &zip_path,
            &[
                ("labelTxt/P0000.txt", b"a".as_slice()),
                ("labelTxt/P0001.txt", b"b".as_slice()),
            ],
        );

        let outdir = tmp.path().join("labelTxt");
        let written = extract_zip(&zip_path, &outdir, false).unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            fs::read_to_string(outdir.join("labelTxt/P0001.txt")).unwrap(),
            "b"
        );
        assert!(zip_path.exists());
    }

    #[test]
    fn test_extract_zip_deletes_archive_when_requested() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("images0.zip");
        write_zip(&zip_path, &[("P0000.png", b"png".as_slice())]);

        extract_zip(&zip_path, &tmp.path().join("images0"), true).unwrap();

        assert!(!zip_path.exists());
        assert!(tmp.path().join("images0/P0000.png").is_file());
    }

    #[test]
    fn test_extract_zip_rejects_escaping_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("evil.zip");
        write_zip(&zip_path, &[("../escaped.txt", b"x".as_slice())]);

        let result = extract_zip(&zip_path, &tmp.path().join("out"), false);

        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_content_root_prefers_nested_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(content_root(tmp.path(), "images"), tmp.path());

        fs::create_dir(tmp.path().join("images")).unwrap();
        assert_eq!(
            content_root(tmp.path(), "images"),
            tmp.path().join("images")
        );
    }

    #[test]
    fn test_move_dir_renames_into_missing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("scratch/labelTxt");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("P0000.txt"), "x").unwrap();

        let dst = tmp.path().join("dataset/labelTxt");
        move_dir(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(dst.join("P0000.txt")).unwrap(), "x");
    }

    #[test]
    fn test_move_dir_merges_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("a.png"), "new").unwrap();
        fs::write(src.join("sub/b.png"), "b").unwrap();
        fs::write(dst.join("a.png"), "old").unwrap();
        fs::write(dst.join("c.png"), "c").unwrap();

        move_dir(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(dst.join("a.png")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("sub/b.png")).unwrap(), "b");
        assert_eq!(fs::read_to_string(dst.join("c.png")).unwrap(), "c");
    }
}
