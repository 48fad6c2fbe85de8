//! Rights attached to directory handles.
//!
//! A root handle is limited once at install time. Every handle opened
//! beneath it inherits the narrowed set, so rights only ever shrink.

use crate::dirfd::DirectoryHandle;
use crate::error::LoaderResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An operation class that may be granted on a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Right {
    /// Read file contents and directory entries.
    Read,

    /// Resolve names relative to a directory (`openat`).
    Lookup,

    /// Query metadata (`fstat`, `fstatat`).
    Fstat,

    /// Reposition a file offset.
    Seek,

    /// Map a file into memory.
    Mmap,

    /// Map a file executable, required by the dynamic loader.
    MmapRx,

    /// Descriptor flag manipulation.
    Fcntl,

    /// Filesystem statistics.
    Fstatfs,

    /// Device control requests.
    Ioctl,

    /// Right understood only by an external limiter.
    Custom(String),
}

impl Right {
    /// Parse a right from a string.
    pub fn parse(s: &str) -> Self {
        match s {
            "read" => Right::Read,
            "lookup" => Right::Lookup,
            "fstat" => Right::Fstat,
            "seek" => Right::Seek,
            "mmap" => Right::Mmap,
            "mmap_rx" => Right::MmapRx,
            "fcntl" => Right::Fcntl,
            "fstatfs" => Right::Fstatfs,
            "ioctl" => Right::Ioctl,
            other => Right::Custom(other.to_string()),
        }
    }

    /// Convert right to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Right::Read => "read",
            Right::Lookup => "lookup",
            Right::Fstat => "fstat",
            Right::Seek => "seek",
            Right::Mmap => "mmap",
            Right::MmapRx => "mmap_rx",
            Right::Fcntl => "fcntl",
            Right::Fstatfs => "fstatfs",
            Right::Ioctl => "ioctl",
            Right::Custom(s) => s,
        }
    }
}

/// A set of rights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rights {
    rights: HashSet<Right>,
}

impl Rights {
    /// Create an empty rights set.
    pub fn new() -> Self {
        Self {
            rights: HashSet::new(),
        }
    }

    /// Every right the loader itself can exercise.
    pub fn all() -> Self {
        [
            Right::Read,
            Right::Lookup,
            Right::Fstat,
            Right::Seek,
            Right::Mmap,
            Right::MmapRx,
            Right::Fcntl,
            Right::Fstatfs,
            Right::Ioctl,
        ]
        .into_iter()
        .collect()
    }

    /// The set needed to load every artifact kind read-only.
    pub fn loader_default() -> Self {
        [
            Right::Read,
            Right::Lookup,
            Right::Fstat,
            Right::Seek,
            Right::MmapRx,
            Right::Mmap,
            Right::Fcntl,
            Right::Fstatfs,
        ]
        .into_iter()
        .collect()
    }

    /// Create a rights set from a list of right names.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rights = strings
            .into_iter()
            .map(|s| Right::parse(s.as_ref()))
            .collect();
        Self { rights }
    }

    /// Add a right to the set.
    pub fn add(&mut self, right: Right) {
        self.rights.insert(right);
    }

    /// Check if the set contains a right.
    pub fn has(&self, right: &Right) -> bool {
        self.rights.contains(right)
    }

    /// Check if this set is a superset of another.
    pub fn contains_all(&self, other: &Rights) -> bool {
        other.rights.is_subset(&self.rights)
    }

    /// Rights present in both sets.
    pub fn intersect(&self, other: &Rights) -> Rights {
        self.rights.intersection(&other.rights).cloned().collect()
    }

    /// Get all rights in the set.
    pub fn iter(&self) -> impl Iterator<Item = &Right> {
        self.rights.iter()
    }

    /// Get the number of rights.
    pub fn len(&self) -> usize {
        self.rights.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.rights.is_empty()
    }
}

impl FromIterator<Right> for Rights {
    fn from_iter<T: IntoIterator<Item = Right>>(iter: T) -> Self {
        Self {
            rights: iter.into_iter().collect(),
        }
    }
}

/// Strips operations from a directory handle when it is installed.
///
/// Kernel-backed limiters (Capsicum `cap_rights_limit` and friends) live
/// outside this crate and implement this trait.
pub trait RightsLimiter: Send + Sync {
    /// Apply this limiter to `handle`.
    fn limit(&self, handle: &DirectoryHandle) -> LoaderResult<()>;
}

impl RightsLimiter for Rights {
    fn limit(&self, handle: &DirectoryHandle) -> LoaderResult<()> {
        handle.restrict_rights(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for name in ["read", "lookup", "fstat", "mmap_rx", "ioctl"] {
            assert_eq!(Right::parse(name).as_str(), name);
        }
        assert_eq!(
            Right::parse("cap_event"),
            Right::Custom("cap_event".to_string())
        );
    }

    #[test]
    fn test_intersect_only_narrows() {
        let granted = Rights::from_strings(["read", "lookup", "fstat"]);
        let limiter = Rights::from_strings(["read", "fstat", "seek"]);
        let narrowed = granted.intersect(&limiter);

        assert_eq!(narrowed.len(), 2);
        assert!(narrowed.has(&Right::Read));
        assert!(narrowed.has(&Right::Fstat));
        assert!(!narrowed.has(&Right::Lookup));
        assert!(!narrowed.has(&Right::Seek));
    }

    #[test]
    fn test_loader_default_is_subset_of_all() {
        assert!(Rights::all().contains_all(&Rights::loader_default()));
        assert!(!Rights::loader_default().has(&Right::Ioctl));
    }
}
