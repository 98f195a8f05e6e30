//! Filesystem access used by the publisher.
//!
//! Every mutation goes through [`Storage`] so tests can inject failures at
//! any step of a multi-file operation.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::Builder;

pub trait Storage {
    /// Reads a file, returning `None` when it does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<String>>;

    fn exists(&self, path: &Path) -> bool;

    /// Replaces `path` so readers see either the old or the new content,
    /// optionally keeping the old content next to it as `<file>.bak`.
    fn write_atomic(&self, path: &Path, content: &str, backup: bool) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn is_empty_dir(&self, path: &Path) -> io::Result<bool>;

    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Removes an empty directory.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn write_atomic(&self, path: &Path, content: &str, backup: bool) -> io::Result<()> {
        write_atomic(path, content, backup)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn is_empty_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::read_dir(path)?.next().is_none())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

pub fn write_atomic(path: &Path, content: &str, backup: bool) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = Builder::new().prefix(".webpub1c").tempfile_in(parent)?;
    tmp.as_file_mut().write_all(content.as_bytes())?;
    tmp.as_file_mut().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            let mode = metadata.permissions().mode();
            let _ = fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode));
        }
    }

    if backup && path.exists() {
        fs::copy(path, backup_path(path))?;
    }

    tmp.persist(path).map(|_| ()).map_err(|err| err.error)
}
