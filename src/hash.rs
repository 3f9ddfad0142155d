//! Content hashing.
//!
//! Checksums are MD5 digests rendered as 32 lowercase hex characters. They
//! fingerprint content against accidental change only; they are not an
//! integrity guarantee against tampering.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};

use crate::config::HASH_CHUNK_SIZE;
use crate::error::{ArchiverError, Result};

/// Incremental hasher for content that arrives in pieces.
#[derive(Default, Clone)]
pub struct ContentHasher {
    inner: Md5,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.inner.update(data.as_ref());
    }

    /// Consumes the hasher and returns the hex digest.
    pub fn finish_hex(self) -> String {
        format!("{:032x}", self.inner.finalize())
    }
}

/// Hashes a byte stream, reading it in bounded chunks.
pub fn md5_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish_hex())
}

/// Hashes the file at `path`.
pub fn md5_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ArchiverError::unreadable(path, e))?;
    md5_reader(file).map_err(|e| ArchiverError::unreadable(path, e))
}

pub fn md5_bytes(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finish_hex()
}
