//! Package checksums.
//!
//! A package is either a single file or a directory tree. Files hash their
//! bytes; trees hash every file's relative path and content in sorted order,
//! so the digest does not depend on directory iteration order.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// SHA-256 hasher for staged packages.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageHasher;

impl PackageHasher {
    /// Creates a new package hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hex-encoded digest of a file or directory tree.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read.
    pub fn hash_path(&self, path: &Path) -> std::io::Result<String> {
        let mut hasher = Sha256::new();

        if path.is_dir() {
            let mut files = Vec::new();
            collect_files(path, &mut files)?;
            files.sort();

            for file in files {
                let relative = file.strip_prefix(path).unwrap_or(&file);
                // Forward slashes on every platform.
                let name = relative.to_string_lossy().replace('\\', "/");
                hasher.update(name.as_bytes());
                hasher.update([0u8]);
                hasher.update(std::fs::read(&file)?);
            }
        } else {
            hasher.update(std::fs::read(path)?);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Compares a declared checksum against a computed one, ignoring case.
    #[must_use]
    pub fn checksums_match(expected: &str, actual: &str) -> bool {
        let expected = expected.trim().to_ascii_lowercase();
        if expected.len() != actual.len() {
            return false;
        }

        expected
            .bytes()
            .zip(actual.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn collect_files(directory: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_digest_matches_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pkg.bin");
        std::fs::write(&file, b"abc").unwrap();

        let digest = PackageHasher::new().hash_path(&file).unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_tree_digest_is_deterministic() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        std::fs::create_dir_all(first.path().join("bin")).unwrap();
        std::fs::write(first.path().join("bin/app"), b"binary").unwrap();
        std::fs::write(first.path().join("readme"), b"text").unwrap();

        std::fs::write(second.path().join("readme"), b"text").unwrap();
        std::fs::create_dir_all(second.path().join("bin")).unwrap();
        std::fs::write(second.path().join("bin/app"), b"binary").unwrap();

        let hasher = PackageHasher::new();
        assert_eq!(
            hasher.hash_path(first.path()).unwrap(),
            hasher.hash_path(second.path()).unwrap()
        );
    }

    #[test]
    fn test_tree_digest_covers_names() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("a"), b"same").unwrap();
        std::fs::write(second.path().join("b"), b"same").unwrap();

        let hasher = PackageHasher::new();
        assert_ne!(
            hasher.hash_path(first.path()).unwrap(),
            hasher.hash_path(second.path()).unwrap()
        );
    }

    #[test]
    fn test_checksums_match() {
        assert!(PackageHasher::checksums_match("ABC123", "abc123"));
        assert!(!PackageHasher::checksums_match("abc123", "abc124"));
        assert!(!PackageHasher::checksums_match("abc123", "abc12"));
    }
}
