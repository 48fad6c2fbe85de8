//! Linking shared libraries from open descriptors.
//!
//! The library file is always opened relative to a directory handle first;
//! only the resulting descriptor is passed to the dynamic linker. FreeBSD
//! links it with `fdlopen(3)`. Elsewhere the descriptor is reached through
//! `/proc/self/fd`, which names the already opened file rather than
//! re-resolving the path it was found under.

use libloading::os::unix::{Library, RTLD_NOW};
use std::os::unix::io::RawFd;

/// Signature of a native entry point.
pub type EntryPoint = unsafe extern "C" fn();

#[cfg(target_os = "freebsd")]
extern "C" {
    fn fdlopen(fd: libc::c_int, mode: libc::c_int) -> *mut libc::c_void;
}

/// Link the shared library behind `fd`.
#[cfg(target_os = "freebsd")]
pub fn open_fd(fd: RawFd) -> Result<Library, String> {
    // SAFETY: `fd` is a live descriptor owned by the caller for the duration of the call.
    let handle = unsafe { fdlopen(fd, RTLD_NOW) };
    if handle.is_null() {
        return Err(last_dl_error());
    }
    // SAFETY: `handle` was just returned by the dynamic linker and is owned by nobody else.
    Ok(unsafe { Library::from_raw(handle) })
}

/// Link the shared library behind `fd`.
#[cfg(not(target_os = "freebsd"))]
pub fn open_fd(fd: RawFd) -> Result<Library, String> {
    let path = format!("/proc/self/fd/{}", fd);
    // SAFETY: running library constructors is inherent to native units.
    unsafe { Library::open(Some(&path), RTLD_NOW) }.map_err(|e| e.to_string())
}

#[cfg(target_os = "freebsd")]
fn last_dl_error() -> String {
    // SAFETY: dlerror returns either null or a valid C string owned by the linker.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown dynamic linker error".to_string();
    }
    // SAFETY: non-null pointer from dlerror, copied before any further dl call.
    unsafe { std::ffi::CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

/// Look up an entry point by symbol name.
///
/// # Safety
///
/// The symbol must really have the [`EntryPoint`] signature, and the
/// returned pointer must not be called after `library` is unloaded.
pub unsafe fn entry_point(library: &Library, symbol: &str) -> Result<EntryPoint, String> {
    let found = library
        .get::<EntryPoint>(symbol.as_bytes())
        .map_err(|e| e.to_string())?;
    Ok(*found)
}
