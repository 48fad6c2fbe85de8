//! Compiled cache format.
//!
//! ## Format
//!
//! ```text
//! +--------------------+
//! | Magic (4 bytes)    |  MAGIC, native byte order
//! +--------------------+
//! | Source mtime (4)   |  low 32 bits of the source's mtime in seconds
//! +--------------------+
//! | Body               |  JSON-encoded `Program`
//! +--------------------+
//! ```
//!
//! A cache is an optimization only. Whoever reads it must be prepared to
//! fall back to the source form.

use crate::dirfd::DirectoryHandle;
use crate::error::{LoaderError, LoaderResult};
use crate::script::Program;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Format identifier of the compiled body understood by this runtime.
pub const MAGIC: u32 = u32::from_le_bytes(*b"CPC\x01");

/// Size of one header field in bytes.
const FIELD_SIZE: usize = 4;

/// The fixed-width prefix of a compiled cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    /// Format identifier.
    pub magic: u32,
    /// Truncated modification time of the source artifact.
    pub source_mtime: u32,
}

impl CacheHeader {
    /// Header for a cache compiled from a source with the given mtime.
    pub fn new(source_mtime: u32) -> Self {
        Self {
            magic: MAGIC,
            source_mtime,
        }
    }

    /// Read and check the header, leaving `reader` positioned at the body.
    ///
    /// A short or mismatched magic is `CorruptCache`; a short mtime field is
    /// `IncompleteCache`.
    pub fn read(reader: &mut impl Read, path: &str) -> LoaderResult<Self> {
        let magic = match read_field(reader)? {
            Some(magic) if magic == MAGIC => magic,
            Some(magic) => {
                return Err(LoaderError::CorruptCache {
                    path: path.to_string(),
                    reason: format!("bad magic number {:#010x}", magic),
                })
            }
            None => {
                return Err(LoaderError::CorruptCache {
                    path: path.to_string(),
                    reason: "truncated magic number".to_string(),
                })
            }
        };

        let source_mtime =
            read_field(reader)?.ok_or_else(|| LoaderError::IncompleteCache(path.to_string()))?;

        Ok(Self {
            magic,
            source_mtime,
        })
    }

    /// Header bytes in native order.
    pub fn to_bytes(&self) -> [u8; 2 * FIELD_SIZE] {
        let mut out = [0u8; 2 * FIELD_SIZE];
        out[..FIELD_SIZE].copy_from_slice(&self.magic.to_ne_bytes());
        out[FIELD_SIZE..].copy_from_slice(&self.source_mtime.to_ne_bytes());
        out
    }
}

/// Read one native-order field; `None` when the stream ends first.
fn read_field(reader: &mut impl Read) -> LoaderResult<Option<u32>> {
    let mut buf = [0u8; FIELD_SIZE];
    let mut filled = 0;
    while filled < FIELD_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(None),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u32::from_ne_bytes(buf)))
}

/// Encode a complete cache file.
pub fn encode(program: &Program, source_mtime: u32) -> LoaderResult<Vec<u8>> {
    let mut out = CacheHeader::new(source_mtime).to_bytes().to_vec();
    out.extend(program.to_bytes()?);
    Ok(out)
}

/// Decode a body, reporting garbage as a corrupt cache.
pub fn decode_body(bytes: &[u8], path: &str) -> LoaderResult<Program> {
    Program::from_bytes(bytes).map_err(|e| LoaderError::CorruptCache {
        path: path.to_string(),
        reason: format!("undecodable body: {}", e),
    })
}

/// Compile `source` (relative to `dir`) and return the cache bytes for it.
///
/// Writing the bytes is left to the caller: directory handles are read-only.
pub fn compile_source(dir: &DirectoryHandle, source: impl AsRef<Path>) -> LoaderResult<Vec<u8>> {
    let source = source.as_ref();
    let mut file = dir.open(source)?;
    let origin = file.name().display().to_string();
    let text = String::from_utf8(file.read_all()?).map_err(|e| LoaderError::Syntax {
        origin: origin.clone(),
        line: 0,
        message: format!("source is not UTF-8: {}", e),
    })?;
    let program = Program::parse(&text, &origin)?;
    let mtime = dir.stat(source)?.mtime_low32();
    debug!("Compiled {} (mtime {})", origin, mtime);
    encode(&program, mtime)
}
