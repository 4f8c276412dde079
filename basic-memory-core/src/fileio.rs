//! File IO utilities: checksums, atomic writes, encoding-tolerant reads.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Compute the lowercase-hex SHA-256 checksum of text content.
pub fn checksum(content: &str) -> String {
    checksum_bytes(content.as_bytes())
}

/// Compute the lowercase-hex SHA-256 checksum of raw bytes.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Ensure a directory exists, creating parents as needed.
pub fn ensure_directory(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Write a file atomically: write to `<path>.tmp`, fsync, rename over the
/// target. The temp file is unlinked on any failure.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let result = (|| -> Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// Read a Markdown file as text.
///
/// UTF-8 first; falls back to UTF-16 when the bytes carry a BOM or decode
/// cleanly as UTF-16LE. Anything else is a parse error for the file.
pub fn read_markdown(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            let bytes = err.into_bytes();
            decode_utf16(&bytes).ok_or_else(|| {
                Error::parse(path.display().to_string(), "file is neither UTF-8 nor UTF-16")
            })
        }
    }
}

/// Decode UTF-16 bytes, honoring a BOM when present and defaulting to
/// little-endian otherwise.
fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let (bytes, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        other => (other, false),
    };

    if bytes.len() % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_stable() {
        let a = checksum("hello world");
        let b = checksum("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, a.to_lowercase());
        assert_ne!(a, checksum("hello world!"));
    }

    #[test]
    fn test_write_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");

        write_atomic(&path, "first").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");

        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        // No temp file left behind
        assert!(!dir.path().join("note.tmp").exists());
    }

    #[test]
    fn test_read_markdown_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("utf8.md");
        std::fs::write(&path, "# Héllo").unwrap();
        assert_eq!(read_markdown(&path).unwrap(), "# Héllo");
    }

    #[test]
    fn test_read_markdown_utf16_le_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("utf16.md");

        let mut bytes = vec![0xFF, 0xFE];
        for unit in "# Hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(read_markdown(&path).unwrap(), "# Hello");
    }

    #[test]
    fn test_read_markdown_invalid_encoding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.md");
        std::fs::write(&path, [0xC3, 0x28, 0xA0]).unwrap();

        assert!(read_markdown(&path).is_err());
    }
}
