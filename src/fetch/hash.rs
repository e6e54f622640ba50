//! Checksum parsing and file digests
//!
//! MD5, SHA-256 and SHA-512 digests are recognised by their hex length;
//! BLAKE3 needs an explicit `blake3:` prefix since it shares SHA-256's length.

use crate::core::output;
use anyhow::{Context, Result, bail};
use sha2::Digest;
use std::fmt;
use std::io::Read;
use std::path::Path;

const READ_BUF: usize = 256 * 1024;

/// Files above this size get a progress bar while hashing.
const LARGE_FILE: u64 = 64 * 1024 * 1024;

const BLAKE3_PREFIX: &str = "blake3:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Md5),
            64 => Some(Self::Sha256),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }
}

/// Running digest for one of the supported algorithms.
enum Hasher {
    Md5(md5::Md5),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::default()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(h) => h.update(bytes),
            Self::Sha256(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
            Self::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// A hex digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    /// Lower-case hex digest.
    pub hex: String,
}

impl Checksum {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (algorithm, hex) = match value.strip_prefix(BLAKE3_PREFIX) {
            Some(hex) => (Some(HashAlgorithm::Blake3), hex),
            None => (HashAlgorithm::from_hex_len(value.len()), value),
        };
        let Some(algorithm) = algorithm else {
            bail!("unrecognized checksum '{}' ({} hex digits)", value, value.len());
        };
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("checksum is not hexadecimal: {}", value);
        }
        Ok(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// Digest of the file at `path`.
    pub fn of_file(path: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        let mut file =
            std::fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or_default();

        let progress = (size > LARGE_FILE).then(|| {
            let pb = output::spinner(&format!("{} checksum", algorithm.name()));
            output::upgrade_to_bytes(&pb, size);
            pb
        });

        let mut hasher = Hasher::new(algorithm);
        let mut buf = vec![0u8; READ_BUF];
        loop {
            let n = file
                .read(&mut buf)
                .with_context(|| format!("cannot read {}", path.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            if let Some(pb) = &progress {
                pb.inc(n as u64);
            }
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        Ok(Self {
            algorithm,
            hex: hasher.finish(),
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.algorithm == HashAlgorithm::Blake3 {
            f.write_str(BLAKE3_PREFIX)?;
        }
        f.write_str(&self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f
    }

    #[test]
    fn test_algorithm_from_length() {
        assert_eq!(Checksum::parse(&"a".repeat(32)).unwrap().algorithm, HashAlgorithm::Md5);
        assert_eq!(Checksum::parse(&"a".repeat(64)).unwrap().algorithm, HashAlgorithm::Sha256);
        assert_eq!(Checksum::parse(&"a".repeat(128)).unwrap().algorithm, HashAlgorithm::Sha512);
        let b3 = Checksum::parse(&format!("blake3:{}", "a".repeat(64))).unwrap();
        assert_eq!(b3.algorithm, HashAlgorithm::Blake3);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Checksum::parse("abc").is_err());
        assert!(Checksum::parse(&"z".repeat(32)).is_err());
    }

    #[test]
    fn test_comparison_is_case_insensitive() {
        let upper = Checksum::parse("D41D8CD98F00B204E9800998ECF8427E").unwrap();
        let lower = Checksum::parse("d41d8cd98f00b204e9800998ecf8427e").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_md5_of_empty_file() {
        let f = file_with(b"");
        let sum = Checksum::of_file(f.path(), HashAlgorithm::Md5).unwrap();
        assert_eq!(sum.hex, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_sha256_of_hello() {
        let f = file_with(b"hello");
        let sum = Checksum::of_file(f.path(), HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            sum.hex,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_blake3_display_keeps_prefix() {
        let f = file_with(b"hello");
        let sum = Checksum::of_file(f.path(), HashAlgorithm::Blake3).unwrap();
        assert!(sum.to_string().starts_with("blake3:"));
        assert_eq!(Checksum::parse(&sum.to_string()).unwrap(), sum);
    }
}
