//! Descriptor-relative directory handles.
//!
//! Every operation on a [`DirectoryHandle`] goes through `openat(2)` or
//! `fstatat(2)` against the descriptor the handle owns. Nothing here
//! rebuilds an absolute path and hands it to the ambient namespace, so a
//! rename or symlink swap of an ancestor directory between two steps of a
//! lookup cannot redirect it.
//!
//! Absolute paths are accepted only when they name something beneath the
//! handle's display name; they are rewritten to a relative path before any
//! system call is made.

use crate::error::{LoaderError, LoaderResult};
use crate::rights::{Right, Rights};
use parking_lot::RwLock;
use std::ffi::{CStr, CString};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Metadata returned by [`DirectoryHandle::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    mode: u32,
    size: u64,
    mtime: i64,
}

impl Metadata {
    fn from_stat(st: &libc::stat) -> Self {
        Self {
            mode: st.st_mode as u32,
            size: st.st_size as u64,
            mtime: st.st_mtime as i64,
        }
    }

    /// Whether this is a regular file.
    pub fn is_file(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFREG as u32
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }

    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Modification time in whole seconds since the epoch.
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    /// Low 32 bits of the modification time, as stored in cache headers.
    pub fn mtime_low32(&self) -> u32 {
        (self.mtime as u64 & 0xFFFF_FFFF) as u32
    }
}

/// A read-only file opened through a directory handle.
///
/// Carries the display name it was opened under so loaders can record
/// where a unit came from.
#[derive(Debug)]
pub struct ArtifactFile {
    file: File,
    name: PathBuf,
}

impl ArtifactFile {
    /// Display name (handle name joined with the relative path).
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Read the remaining contents.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Consume the wrapper, keeping the file.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl Read for ArtifactFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl AsRawFd for ArtifactFile {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// An owned handle to an open directory.
pub struct DirectoryHandle {
    name: PathBuf,
    fd: RwLock<Option<OwnedFd>>,
    rights: RwLock<Option<Rights>>,
}

impl DirectoryHandle {
    /// Open a directory through the ambient namespace.
    ///
    /// This is the only path-based open in the crate. It is used to create
    /// root handles before the process gives up path-based access. A
    /// relative `path` is named after the working directory at open time,
    /// so locations derived from the handle stay valid once it changes.
    pub fn open_path(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let name = absolute_name(path)?;
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(path)?;
        debug!("Opened root directory {:?}", name);
        Ok(Self::from_owned(name, OwnedFd::from(file), None))
    }

    fn from_owned(name: PathBuf, fd: OwnedFd, rights: Option<Rights>) -> Self {
        Self {
            name,
            fd: RwLock::new(Some(fd)),
            rights: RwLock::new(rights),
        }
    }

    /// Display name used for diagnostics and unit metadata.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.fd.read().is_none()
    }

    /// Release the descriptor. Calling this more than once is harmless.
    pub fn close(&self) {
        if self.fd.write().take().is_some() {
            debug!("Closed directory handle {:?}", self.name);
        }
    }

    /// Rights currently granted, `None` when the handle was never limited.
    pub fn rights(&self) -> Option<Rights> {
        self.rights.read().clone()
    }

    /// Narrow the granted rights to those also present in `limit`.
    pub fn restrict_rights(&self, limit: &Rights) -> LoaderResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let mut rights = self.rights.write();
        let narrowed = match rights.as_ref() {
            Some(current) => current.intersect(limit),
            None => limit.clone(),
        };
        debug!(
            "Limited {:?} to {} rights",
            self.name,
            narrowed.len()
        );
        *rights = Some(narrowed);
        Ok(())
    }

    fn require(&self, right: Right) -> LoaderResult<()> {
        match self.rights.read().as_ref() {
            Some(granted) if !granted.has(&right) => Err(LoaderError::RightsDenied {
                handle: self.name.display().to_string(),
                right: right.as_str().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn closed_error(&self) -> LoaderError {
        LoaderError::ClosedHandle(self.name.display().to_string())
    }

    /// Run `f` with the raw descriptor while holding it open.
    fn with_fd<T>(&self, f: impl FnOnce(RawFd) -> LoaderResult<T>) -> LoaderResult<T> {
        let guard = self.fd.read();
        match guard.as_ref() {
            Some(fd) => f(fd.as_raw_fd()),
            None => Err(self.closed_error()),
        }
    }

    /// Rewrite `path` to a normalized path relative to this handle.
    ///
    /// Returns `.` when the path names the handle itself.
    pub fn relative_path(&self, path: impl AsRef<Path>) -> LoaderResult<PathBuf> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(LoaderError::BadPath("empty path".to_string()));
        }

        let normalized = normalize(path)?;
        let relative = if normalized.is_absolute() {
            let root = normalize(&self.name)?;
            match normalized.strip_prefix(&root) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => {
                    return Err(LoaderError::BadPath(format!(
                        "path {} not a child of {}",
                        path.display(),
                        self.name.display()
                    )))
                }
            }
        } else {
            normalized
        };

        if relative.as_os_str().is_empty() {
            Ok(PathBuf::from("."))
        } else {
            Ok(relative)
        }
    }

    fn openat(&self, relative: &Path, flags: libc::c_int) -> LoaderResult<OwnedFd> {
        self.require(Right::Lookup)?;
        let c_path = to_cstring(relative)?;
        self.with_fd(|dirfd| {
            // SAFETY: `dirfd` stays open for the duration of the call (read
            // lock held) and `c_path` is a valid NUL-terminated string.
            let fd = unsafe { libc::openat(dirfd, c_path.as_ptr(), flags | libc::O_CLOEXEC) };
            if fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            // SAFETY: `fd` was just returned by openat and is owned by nobody else.
            Ok(unsafe { OwnedFd::from_raw_fd(fd) })
        })
    }

    /// Open a file read-only.
    pub fn open(&self, path: impl AsRef<Path>) -> LoaderResult<ArtifactFile> {
        self.open_mode(path, "rb")
    }

    /// Open a file with an `fopen`-style mode string; any write, append,
    /// update or create component is refused.
    pub fn open_mode(&self, path: impl AsRef<Path>, mode: &str) -> LoaderResult<ArtifactFile> {
        let bad: String = mode.chars().filter(|c| "wax+".contains(*c)).collect();
        if !bad.is_empty() {
            return Err(LoaderError::BadMode(format!(
                "invalid mode components {:?}",
                bad
            )));
        }

        let path = path.as_ref();
        let relative = self.relative_path(path)?;
        if relative == Path::new(".") {
            return Err(LoaderError::BadPath(format!(
                "{} names the directory itself",
                path.display()
            )));
        }
        self.require(Right::Read)?;

        let fd = self.openat(&relative, libc::O_RDONLY)?;
        Ok(ArtifactFile {
            file: File::from(fd),
            name: self.name.join(&relative),
        })
    }

    /// Open a subdirectory as a new handle with the same rights.
    pub fn open_subdirectory(&self, path: impl AsRef<Path>) -> LoaderResult<DirectoryHandle> {
        let relative = self.relative_path(path)?;
        let fd = self.openat(&relative, libc::O_RDONLY | libc::O_DIRECTORY)?;
        let name = if relative == Path::new(".") {
            self.name.clone()
        } else {
            self.name.join(&relative)
        };
        Ok(Self::from_owned(name, fd, self.rights()))
    }

    /// Stat a path relative to this handle.
    pub fn stat(&self, path: impl AsRef<Path>) -> LoaderResult<Metadata> {
        let relative = self.relative_path(path)?;
        self.require(Right::Fstat)?;
        let c_path = to_cstring(&relative)?;
        self.with_fd(|dirfd| {
            // SAFETY: an all-zero `stat` is a valid value for the kernel to overwrite.
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            // SAFETY: valid descriptor, valid C string and a properly sized out buffer.
            let rc = unsafe { libc::fstatat(dirfd, c_path.as_ptr(), &mut st, 0) };
            if rc != 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(Metadata::from_stat(&st))
        })
    }

    /// Stat that maps absence to `None` and propagates every other error.
    fn quiet_stat(&self, path: &Path) -> LoaderResult<Option<Metadata>> {
        match self.stat(path) {
            Ok(meta) => Ok(Some(meta)),
            Err(LoaderError::BadPath(_)) => Ok(None),
            Err(LoaderError::Io(e)) if is_absent(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether anything exists at `path`.
    pub fn exists(&self, path: impl AsRef<Path>) -> LoaderResult<bool> {
        Ok(self.quiet_stat(path.as_ref())?.is_some())
    }

    /// Whether `path` is a regular file.
    pub fn is_file(&self, path: impl AsRef<Path>) -> LoaderResult<bool> {
        Ok(self
            .quiet_stat(path.as_ref())?
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    /// Whether `path` is a directory.
    pub fn is_directory(&self, path: impl AsRef<Path>) -> LoaderResult<bool> {
        Ok(self
            .quiet_stat(path.as_ref())?
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    /// Names of the entries in this directory, excluding `.` and `..`.
    pub fn list(&self) -> LoaderResult<Vec<String>> {
        self.require(Right::Read)?;
        let fd = self.openat(Path::new("."), libc::O_RDONLY | libc::O_DIRECTORY)?;

        // A fresh descriptor keeps the stream offset independent of ours.
        let raw = std::os::fd::IntoRawFd::into_raw_fd(fd);
        // SAFETY: `raw` is an open directory descriptor; on success the DIR
        // stream owns it and closedir releases it.
        let dir = unsafe { libc::fdopendir(raw) };
        if dir.is_null() {
            let err = io::Error::last_os_error();
            // SAFETY: fdopendir failed, so we still own `raw`.
            unsafe { libc::close(raw) };
            return Err(err.into());
        }

        let mut names = Vec::new();
        loop {
            // SAFETY: `dir` is a valid stream until closedir below.
            let entry = unsafe { libc::readdir(dir) };
            if entry.is_null() {
                break;
            }
            // SAFETY: readdir returned a valid dirent whose d_name is NUL-terminated.
            let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) };
            let name = name.to_string_lossy();
            if name != "." && name != ".." {
                names.push(name.into_owned());
            }
        }
        // SAFETY: `dir` came from fdopendir and is closed exactly once.
        unsafe { libc::closedir(dir) };

        names.sort();
        Ok(names)
    }
}

impl fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.display())
    }
}

fn is_absent(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENOTDIR)
}

fn to_cstring(path: &Path) -> LoaderResult<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| LoaderError::BadPath(format!("{:?} contains a NUL byte", path)))
}

/// Normalized absolute form of `path`, anchored at the working directory.
///
/// Symlinks are not resolved; the result only names the directory.
pub fn absolute_name(path: &Path) -> LoaderResult<PathBuf> {
    if path.is_absolute() {
        return normalize(path);
    }
    let cwd = std::env::current_dir()?;
    normalize(&cwd.join(path))
}

/// Lexically normalize a path, rejecting `..` that climbs above its start.
fn normalize(path: &Path) -> LoaderResult<PathBuf> {
    let mut absolute = false;
    let mut components = Vec::with_capacity(8);

    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::Normal(name) => components.push(name),
            Component::ParentDir => {
                if components.pop().is_none() {
                    return Err(LoaderError::BadPath(format!(
                        "{} escapes its root",
                        path.display()
                    )));
                }
            }
            Component::Prefix(_) => {
                return Err(LoaderError::BadPath(format!(
                    "{} has an unsupported prefix",
                    path.display()
                )))
            }
        }
    }

    let mut result = if absolute {
        PathBuf::from("/")
    } else {
        PathBuf::new()
    };
    for component in components {
        result.push(component);
    }
    Ok(result)
}
