//! Content fingerprints for change detection.
//!
//! A fingerprint is a fixed-width digest of a file's full byte content. The
//! default is XXH3-128, a fast non-cryptographic hash: it detects bit rot and
//! accidental edits, not deliberate forgery. SHA-256 is available when a
//! slower but collision-resistant digest is preferred.
//!
//! Files are read in bounded chunks so peak memory does not depend on file
//! size, and the digest does not depend on the chunk size.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::Xxh3;

/// Default read chunk: large enough to amortize syscalls, small enough to
/// keep a pool of hashing workers cheap.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Smallest accepted chunk size.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Digest algorithm used for an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// XXH3 with a 128-bit result.
    #[default]
    Xxh128,
    /// SHA-256.
    Sha256,
}

impl Algorithm {
    /// Length of the hex rendering of a digest.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Xxh128 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Name as stored in the index header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xxh128 => "xxh128",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh128" | "xxh3" | "xxh3-128" => Ok(Self::Xxh128),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(format!("Unknown fingerprint algorithm: {s}")),
        }
    }
}

/// Lowercase hex digest of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a hex digest produced by `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns a message if the length or the characters are wrong.
    pub fn parse(hex: &str, algorithm: Algorithm) -> Result<Self, String> {
        if hex.len() != algorithm.hex_len() {
            return Err(format!(
                "expected {} hex characters for {algorithm}, got {}",
                algorithm.hex_len(),
                hex.len()
            ));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(format!("invalid fingerprint '{hex}'"));
        }
        Ok(Self(hex.to_string()))
    }

    /// Hex rendering.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for human output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental hash state for one file.
enum Accumulator {
    Xxh(Box<Xxh3>),
    Sha(Sha256),
}

impl Accumulator {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Xxh128 => Self::Xxh(Box::new(Xxh3::new())),
            Algorithm::Sha256 => Self::Sha(Sha256::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Xxh(h) => h.update(chunk),
            Self::Sha(h) => h.update(chunk),
        }
    }

    fn finish(self) -> Fingerprint {
        match self {
            Self::Xxh(h) => Fingerprint(format!("{:032x}", h.digest128())),
            Self::Sha(h) => Fingerprint(format!("{:x}", h.finalize())),
        }
    }
}

/// Computes fingerprints by streaming a reader in fixed-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    algorithm: Algorithm,
    chunk_size: usize,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(Algorithm::default(), DEFAULT_CHUNK_SIZE)
    }
}

impl Fingerprinter {
    /// Create a fingerprinter. `chunk_size` is clamped to [`MIN_CHUNK_SIZE`].
    #[must_use]
    pub fn new(algorithm: Algorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest everything `reader` yields. Returns the fingerprint and the
    /// number of bytes consumed.
    ///
    /// A zero-length input has a well-defined digest.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if a read fails part-way; no partial
    /// digest is ever returned.
    pub fn digest<R: Read>(&self, mut reader: R) -> io::Result<(Fingerprint, u64)> {
        let mut acc = Accumulator::new(self.algorithm);
        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            acc.update(&buf[..n]);
            total += n as u64;
        }
        Ok((acc.finish(), total))
    }

    /// Digest an in-memory buffer.
    #[must_use]
    pub fn digest_bytes(&self, bytes: &[u8]) -> Fingerprint {
        let mut acc = Accumulator::new(self.algorithm);
        acc.update(bytes);
        acc.finish()
    }

    /// Wrap `reader` so the bytes passing through are hashed.
    pub fn hashing_reader<R: Read>(&self, reader: R) -> HashingReader<R> {
        HashingReader {
            inner: reader,
            acc: Accumulator::new(self.algorithm),
            bytes: 0,
        }
    }
}

/// Reader adapter that fingerprints everything read through it.
///
/// Used when copying so the destination can be verified against the expected
/// fingerprint without reading it back.
pub struct HashingReader<R> {
    inner: R,
    acc: Accumulator,
    bytes: u64,
}

impl<R> HashingReader<R> {
    /// Finish hashing. Returns the fingerprint and byte count seen so far.
    pub fn finish(self) -> (Fingerprint, u64) {
        (self.acc.finish(), self.bytes)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.acc.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}
