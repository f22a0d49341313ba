// Digest computation module
// md5 and sha1 in a single pass over the file contents

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest as Md5Digest, Md5};
use memmap2::Mmap;
use sha1::{Digest as Sha1Digest, Sha1};

use crate::error::SyncError;

/// Files at or above this size are memory-mapped instead of read through
/// a buffer. Mapping assumes the file is not concurrently modified.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

const BUFFER_SIZE: usize = 64 * 1024;

/// Content digests of one file. Remote backends supply one of the two
/// (gdrive/s3 report md5, box/onedrive report sha1); local scans fill both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digests {
    pub md5: Option<String>,
    pub sha1: Option<String>,
}

impl Digests {
    pub fn from_md5(md5: impl Into<String>) -> Self {
        Self { md5: Some(md5.into()), sha1: None }
    }

    pub fn from_sha1(sha1: impl Into<String>) -> Self {
        Self { md5: None, sha1: Some(sha1.into()) }
    }

    /// The preferred identity digest: md5 when present, else sha1.
    pub fn primary(&self) -> Option<&str> {
        self.md5.as_deref().or(self.sha1.as_deref())
    }

    /// All digests present on this record, for hash-index population.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.md5.as_deref().into_iter().chain(self.sha1.as_deref())
    }

    /// Two digest sets match when any algorithm they share agrees.
    pub fn matches(&self, other: &Digests) -> bool {
        match (&self.md5, &other.md5) {
            (Some(a), Some(b)) => return a == b,
            _ => {}
        }
        match (&self.sha1, &other.sha1) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.md5.is_none() && self.sha1.is_none()
    }
}

/// Compute md5 and sha1 of a file in one read, returning the digests and
/// the number of bytes scanned.
pub fn digest_file(path: &Path) -> Result<(Digests, u64), SyncError> {
    let file = File::open(path)
        .map_err(|e| SyncError::from_io_error(e, "opening for digest", Some(path.to_path_buf())))?;
    let size = file
        .metadata()
        .map_err(|e| SyncError::from_io_error(e, "reading metadata of", Some(path.to_path_buf())))?
        .len();

    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();

    if size >= MMAP_THRESHOLD {
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => {
                Md5Digest::update(&mut md5, &mmap[..]);
                Sha1Digest::update(&mut sha1, &mmap[..]);
                return Ok((finish(md5, sha1), size));
            }
            // mmap can fail on network filesystems; fall through to buffered I/O
            Err(_) => {}
        }
    }

    let mut file = file;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| SyncError::from_io_error(e, "reading", Some(path.to_path_buf())))?;
        if n == 0 {
            break;
        }
        Md5Digest::update(&mut md5, &buffer[..n]);
        Sha1Digest::update(&mut sha1, &buffer[..n]);
    }

    Ok((finish(md5, sha1), size))
}

/// Compute md5 and sha1 of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> Digests {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    Md5Digest::update(&mut md5, data);
    Sha1Digest::update(&mut sha1, data);
    finish(md5, sha1)
}

fn finish(md5: Md5, sha1: Sha1) -> Digests {
    Digests {
        md5: Some(bytes_to_hex(&Md5Digest::finalize(md5))),
        sha1: Some(bytes_to_hex(&Sha1Digest::finalize(sha1))),
    }
}

/// Convert bytes to a lowercase hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
