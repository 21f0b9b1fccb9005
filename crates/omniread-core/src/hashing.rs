//! Content fingerprints used as catalog keys.

use crate::catalog::ContentHash;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SAMPLE_BYTES: usize = 8192;

/// Maps a file's bytes to a stable fingerprint. Two files with identical bytes
/// must always produce the same hash.
pub trait ContentHasher: Send + Sync {
    fn hash(&self, path: &Path) -> Result<ContentHash>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    /// Leading sample plus file length; fast on large files.
    #[default]
    Sampled,
    /// Every byte of the file.
    Full,
}

/// SHA-256 over the first `sample_bytes` of the file followed by the file
/// length as little-endian bytes.
#[derive(Debug, Clone, Copy)]
pub struct SampledDigestHasher {
    pub sample_bytes: usize,
}

impl Default for SampledDigestHasher {
    fn default() -> Self {
        Self {
            sample_bytes: DEFAULT_SAMPLE_BYTES,
        }
    }
}

impl ContentHasher for SampledDigestHasher {
    fn hash(&self, path: &Path) -> Result<ContentHash> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
        let size = file
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        let mut sample = Vec::with_capacity(self.sample_bytes);
        file.take(self.sample_bytes as u64)
            .read_to_end(&mut sample)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(&sample);
        hasher.update(size.to_le_bytes());
        let hash = ContentHash::new(format!("{:x}", hasher.finalize()));
        debug!(path = %path.display(), size, sampled = sample.len(), hash = %hash.short(), "Hashed file");
        Ok(hash)
    }
}

/// SHA-256 of the entire file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullDigestHasher;

impl ContentHasher for FullDigestHasher {
    fn hash(&self, path: &Path) -> Result<ContentHash> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buf)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(ContentHash::new(format!("{:x}", hasher.finalize())))
    }
}

pub fn hasher_for(strategy: HashStrategy, sample_bytes: usize) -> Arc<dyn ContentHasher> {
    match strategy {
        HashStrategy::Sampled => Arc::new(SampledDigestHasher {
            sample_bytes: sample_bytes.max(1),
        }),
        HashStrategy::Full => Arc::new(FullDigestHasher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn identical_bytes_hash_identically_across_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.epub");
        let b = dir.path().join("nested-copy.epub");
        fs::write(&a, b"same bytes in both files").unwrap();
        fs::write(&b, b"same bytes in both files").unwrap();

        for hasher in [hasher_for(HashStrategy::Sampled, 8192), hasher_for(HashStrategy::Full, 0)] {
            assert_eq!(hasher.hash(&a).unwrap(), hasher.hash(&b).unwrap());
        }
    }

    #[test]
    fn sampled_hash_includes_file_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let short = dir.path().join("short.epub");
        let long = dir.path().join("long.epub");
        fs::write(&short, b"abcd").unwrap();
        fs::write(&long, b"abcdEXTRA").unwrap();

        let hasher = SampledDigestHasher { sample_bytes: 4 };
        assert_ne!(hasher.hash(&short).unwrap(), hasher.hash(&long).unwrap());
    }

    #[test]
    fn sampled_hash_ignores_bytes_past_sample_of_same_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = dir.path().join("first.epub");
        let second = dir.path().join("second.epub");
        fs::write(&first, b"headerAAAA").unwrap();
        fs::write(&second, b"headerBBBB").unwrap();

        let sampled = SampledDigestHasher { sample_bytes: 6 };
        assert_eq!(sampled.hash(&first).unwrap(), sampled.hash(&second).unwrap());
        assert_ne!(
            FullDigestHasher.hash(&first).unwrap(),
            FullDigestHasher.hash(&second).unwrap()
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(SampledDigestHasher::default()
            .hash(&dir.path().join("absent.epub"))
            .is_err());
    }

    #[test]
    fn strategy_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: HashStrategy,
        }
        let parsed: Wrapper = toml::from_str("strategy = \"full\"").unwrap();
        assert_eq!(parsed.strategy, HashStrategy::Full);
    }
}
