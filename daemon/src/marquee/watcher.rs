//! Modification tracking for the marquee log file.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Reads attempted before giving up on a file that keeps changing under us.
const SETTLE_ATTEMPTS: usize = 3;

/// What identifies one version of the file. The length is tracked alongside
/// the mtime because coarse filesystem timestamps can repeat within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }
}

/// Result of one poll of the log file.
#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    Unchanged,
    /// The file changed. Call [`LogFileWatchState::commit`] with `stamp` once
    /// `content` has been handled, or leave it uncommitted to re-read it.
    Changed { content: String, stamp: FileStamp },
    /// The file was missing and has been recreated empty.
    Recreated,
}

#[derive(Debug)]
pub struct LogFileWatchState {
    path: PathBuf,
    last_modified: Option<FileStamp>,
}

impl LogFileWatchState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records the current version without reporting it, so content that was
    /// already present at startup is not replayed.
    pub fn prime(&mut self) {
        match FileStamp::of(&self.path) {
            Ok(stamp) => self.last_modified = Some(stamp),
            Err(_) => {
                self.recreate();
            }
        }
    }

    pub fn commit(&mut self, stamp: FileStamp) {
        self.last_modified = Some(stamp);
    }

    /// Checks the file once. A missing file is recreated empty and the state
    /// reset to the new file.
    pub fn poll(&mut self) -> io::Result<Poll> {
        let stamp = match FileStamp::of(&self.path) {
            Ok(stamp) => stamp,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.recreate();
                return Ok(Poll::Recreated);
            }
            Err(e) => return Err(e),
        };

        if self.last_modified == Some(stamp) {
            return Ok(Poll::Unchanged);
        }
        let path = &self.path;
        let (bytes, stamp) = read_settled(stamp, || FileStamp::of(path), || fs::read(path))?;
        Ok(Poll::Changed {
            content: String::from_utf8_lossy(&bytes).into_owned(),
            stamp,
        })
    }

    fn recreate(&mut self) {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::warn!("Cannot create marquee log directory {}: {e}", dir.display());
            }
        }
        match fs::File::create(&self.path) {
            Ok(_) => tracing::info!("Recreated empty marquee log {}", self.path.display()),
            Err(e) => tracing::warn!("Cannot recreate marquee log {}: {e}", self.path.display()),
        }
        self.last_modified = FileStamp::of(&self.path).ok();
    }
}

/// Reads the file and returns the content with the stamp it was read under.
///
/// If the file changes during the read, it is read again under the new stamp.
/// A file that never settles is returned under `first`, so the next poll
/// sees a newer stamp and re-reads it.
fn read_settled<S, R>(
    first: FileStamp,
    mut stat: S,
    mut read: R,
) -> io::Result<(Vec<u8>, FileStamp)>
where
    S: FnMut() -> io::Result<FileStamp>,
    R: FnMut() -> io::Result<Vec<u8>>,
{
    let mut before = first;
    let mut bytes = Vec::new();
    for _ in 0..SETTLE_ATTEMPTS {
        bytes = read()?;
        let after = stat()?;
        if after == before {
            return Ok((bytes, after));
        }
        before = after;
    }
    Ok((bytes, first))
}
