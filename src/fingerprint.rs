use std::fs::File;
use std::hash::Hasher;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use log::trace;
use twox_hash::XxHash64;

use crate::record::{Digest, FileRecord};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Files at or below this size are always hashed whole: one full read costs
/// no more than a partial one and gives a stricter key.
pub const SMALL_FILE_THRESHOLD: u64 = 254 * KIB;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Named position inside a file from which a region is sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Anchor {
    Front,
    End,
    Middle,
    FirstQuarter,
    ThirdQuarter,
}

impl Anchor {
    pub const ALL: [Anchor; 5] = [
        Anchor::Front,
        Anchor::End,
        Anchor::Middle,
        Anchor::FirstQuarter,
        Anchor::ThirdQuarter,
    ];

    /// Start of the sampled region for a file of `size` bytes read in chunks
    /// of `chunk` bytes. Negative offsets clamp to 0.
    pub fn offset(self, size: u64, chunk: u64) -> u64 {
        match self {
            Anchor::Front => 0,
            Anchor::End => size.saturating_sub(chunk),
            Anchor::Middle => size.saturating_sub(chunk) / 2,
            Anchor::FirstQuarter => (size / 4).saturating_sub(chunk / 2),
            Anchor::ThirdQuarter => {
                let three_quarters = (u128::from(size) * 3 / 4) as u64;
                three_quarters.saturating_sub(chunk / 2)
            }
        }
    }
}

/// Region size used for anchored sampling of a file of `size` bytes.
pub fn chunk_size(size: u64) -> u64 {
    match size {
        s if s <= SMALL_FILE_THRESHOLD => s,
        s if s <= 5 * MIB => 64 * KIB,
        s if s <= 15 * MIB => 128 * KIB,
        s if s <= 30 * MIB => 256 * KIB,
        s if s <= 60 * MIB => 512 * KIB,
        s if s <= 120 * MIB => MIB,
        _ => 2 * MIB,
    }
}

/// Computes region and whole-file digests, counting the I/O it performs.
///
/// Every read opens the file once; `reads` counts those opens and
/// `bytes_read` the bytes fed to the hasher.
#[derive(Debug, Default)]
pub struct FingerprintEngine {
    reads: AtomicU64,
    bytes_read: AtomicU64,
}

impl FingerprintEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Hashes the entire file, caching the digest on the record.
    ///
    /// A cached digest is returned without touching the disk. On failure the
    /// record is left unchanged so the error surfaces again if retried.
    pub fn digest_whole(&self, record: &FileRecord) -> Result<Digest> {
        let mut slot = record.full_digest_slot();
        if let Some(digest) = *slot {
            return Ok(digest);
        }

        let digest = self.hash_file(&record.path)?;
        *slot = Some(digest);
        Ok(digest)
    }

    /// Hashes the region of the file starting at `anchor`.
    ///
    /// Small files and files that already carry a whole-file digest are keyed
    /// by that digest instead.
    pub fn digest_region(&self, record: &FileRecord, anchor: Anchor) -> Result<Digest> {
        if let Some(digest) = record.cached_full_digest() {
            return Ok(digest);
        }
        if record.size <= SMALL_FILE_THRESHOLD {
            return self.digest_whole(record);
        }

        let chunk = chunk_size(record.size);
        let offset = anchor.offset(record.size, chunk);
        let len = chunk.min(record.size.saturating_sub(offset));
        trace!(
            "{:?} region of '{}': {} bytes at offset {}",
            anchor,
            record.path.display(),
            len,
            offset
        );
        self.hash_region(&record.path, offset, len)
    }

    fn hash_file(&self, path: &Path) -> Result<Digest> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut hasher = XxHash64::with_seed(0);
        let mut buffer = vec![0; READ_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let bytes_read = file
                .read(&mut buffer)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            if bytes_read == 0 {
                break;
            }
            hasher.write(&buffer[..bytes_read]);
            total += bytes_read as u64;
        }
        self.bytes_read.fetch_add(total, Ordering::Relaxed);

        Ok(Digest::from_u64(hasher.finish()))
    }

    fn hash_region(&self, path: &Path, offset: u64, len: u64) -> Result<Digest> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("Failed to seek to {} in '{}'", offset, path.display()))?;
        let mut chunk = Vec::with_capacity(len as usize);
        file.take(len)
            .read_to_end(&mut chunk)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        if chunk.is_empty() {
            bail!("No bytes at offset {} in '{}'", offset, path.display());
        }
        self.bytes_read
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);

        let mut hasher = XxHash64::with_seed(0);
        hasher.write(&chunk);
        Ok(Digest::from_u64(hasher.finish()))
    }
}
