use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Serialize, Serializer};

/// Raw 8-byte xxHash64 output of a sampled byte region.
///
/// Equal digests mean "probably equal content in the sampled region", never
/// proven identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 8]);

impl Digest {
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A candidate file produced by the catalog for one scan.
///
/// `path` and `size` never change after construction. The whole-file digest
/// is filled at most once, by the first stage that needs it, and reused by
/// every later stage.
#[derive(Debug)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    full_digest: Mutex<Option<Digest>>,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            full_digest: Mutex::new(None),
        }
    }

    /// Returns the whole-file digest if some stage already computed it.
    pub fn cached_full_digest(&self) -> Option<Digest> {
        *self.full_digest_slot()
    }

    /// Locks the write-once digest slot. Holding the guard while hashing keeps
    /// concurrent stages from reading the same file twice.
    pub(crate) fn full_digest_slot(&self) -> MutexGuard<'_, Option<Digest>> {
        // A poisoned slot still holds either None or a finished digest.
        self.full_digest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Files that matched on every stage the cascade ran for their branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CandidateGroup {
    pub size: u64,
    #[serde(serialize_with = "serialize_lossy_paths")]
    pub files: Vec<PathBuf>,
}

/// Writes a path as text, replacing bytes that are not valid UTF-8.
pub(crate) fn serialize_lossy_path<S: Serializer>(
    path: &Path,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

fn serialize_lossy_paths<S: Serializer>(
    paths: &[PathBuf],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(paths.iter().map(|path| path.to_string_lossy()))
}

impl CandidateGroup {
    /// Bytes that would be freed by keeping a single copy.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.files.len().saturating_sub(1)) as u64
    }
}
