//! SHA256 verification of downloaded assets.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

/// Compute the SHA256 of a file, streaming it in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file against an expected SHA256, deleting it on mismatch.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        let _ = fs::remove_file(path);
        bail!(
            "Checksum mismatch for {}!\n  Expected: {}\n  Got: {}\n\
             The download may be corrupted. Deleted the file.",
            path.display(),
            expected,
            actual
        );
    }
    log::info!("Checksum verified for {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("hello\n")
    const HELLO_SHA256: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, "hello\n").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_verify_accepts_uppercase() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, "hello\n").unwrap();
        verify_sha256(&path, &HELLO_SHA256.to_uppercase()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_verify_mismatch_deletes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, "tampered\n").unwrap();

        let err = verify_sha256(&path, HELLO_SHA256).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
        assert!(!path.exists());
    }
}
