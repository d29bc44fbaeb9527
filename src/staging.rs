//! Staging Tree - Temporary Package Root
//!
//! The staging directory is removed when `StagingDir` drops, on success
//! and on every error path.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, warn};

const STAGING_PREFIX: &str = "packforge";

/// Exclusively owned temporary build root
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()?;
        debug!("Staging directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` at `path`, creating parent directories
    pub fn write(&self, path: &Path, content: &str, mode: u32) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        set_mode(path, mode)?;
        debug!("Staged {}", path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Outcome of a best-effort tree copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files: usize,
    pub skipped: usize,
}

/// Recursively copy `src` into `dst`, preserving permissions and symlinks.
///
/// `src` must be a directory. Failures on individual entries are logged
/// and counted; only failing to read or create the top level is an error.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<CopyReport> {
    let meta = fs::metadata(src)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", src.display()),
        ));
    }

    fs::create_dir_all(dst)?;
    fs::set_permissions(dst, meta.permissions())?;

    let mut report = CopyReport::default();
    for entry in fs::read_dir(src)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", src.display(), e);
                report.skipped += 1;
                continue;
            }
        };
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        match copy_entry(&entry, &src_path, &dst_path) {
            Ok(nested) => {
                report.files += nested.files;
                report.skipped += nested.skipped;
            }
            Err(e) => {
                warn!("Failed to copy {}: {}", src_path.display(), e);
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

fn copy_entry(entry: &fs::DirEntry, src: &Path, dst: &Path) -> io::Result<CopyReport> {
    let file_type = entry.file_type()?;

    if file_type.is_dir() {
        return copy_tree(src, dst);
    }

    #[cfg(unix)]
    {
        if file_type.is_symlink() {
            let target = fs::read_link(src)?;
            std::os::unix::fs::symlink(&target, dst)?;
            return Ok(CopyReport { files: 1, skipped: 0 });
        }
    }

    // fs::copy carries the permission bits over
    fs::copy(src, dst)?;
    Ok(CopyReport { files: 1, skipped: 0 })
}
