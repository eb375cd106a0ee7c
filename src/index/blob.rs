//! Deduplicated newline-delimited string store, zstd-compressed at rest.
//!
//! A blob holds one payload per line; companion tries map keys to the u32
//! byte offset of their line. The compressed file is decompressed into
//! memory once on open and held for the life of the process.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::{Result, TaxoniqError};

/// Compression level for blobs at rest; these are written once and shipped.
const ZSTD_LEVEL: i32 = 19;

/// An in-memory decompressed string store.
pub struct StringBlob {
    data: Vec<u8>,
}

impl StringBlob {
    pub fn open(path: &Path) -> Result<Self> {
        let compressed = fs::read(path)?;
        let data = zstd::decode_all(&compressed[..]).map_err(|e| {
            TaxoniqError::CorruptIndex(format!("{}: zstd: {e}", path.display()))
        })?;
        Ok(StringBlob { data })
    }

    /// The payload starting at `offset`, up to its newline terminator.
    pub fn get(&self, offset: u32) -> Result<&str> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(TaxoniqError::CorruptIndex(format!(
                "blob offset {offset} beyond end of store ({} bytes)",
                self.data.len()
            )));
        }
        let end = self.data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| start + i)
            .ok_or_else(|| {
                TaxoniqError::CorruptIndex(format!("unterminated blob entry at offset {offset}"))
            })?;
        std::str::from_utf8(&self.data[start..end]).map_err(|e| {
            TaxoniqError::CorruptIndex(format!("non-UTF-8 blob entry at offset {offset}: {e}"))
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Accumulates payloads, deduplicating identical values by content digest.
pub struct BlobBuilder {
    data: Vec<u8>,
    seen: HashMap<[u8; 32], u32>,
}

impl BlobBuilder {
    pub fn new() -> Self {
        BlobBuilder {
            data: Vec::new(),
            seen: HashMap::new(),
        }
    }

    /// Append `value` (interior newlines become spaces) and return the
    /// offset of its line. Identical payloads share one line.
    pub fn append(&mut self, value: &str) -> Result<u32> {
        let payload = value.replace('\n', " ");
        let digest: [u8; 32] = Sha256::digest(payload.as_bytes()).into();
        if let Some(&offset) = self.seen.get(&digest) {
            return Ok(offset);
        }
        let offset = u32::try_from(self.data.len()).map_err(|_| {
            TaxoniqError::Build("string store exceeds u32 offset range".to_string())
        })?;
        self.data.extend_from_slice(payload.as_bytes());
        self.data.push(b'\n');
        self.seen.insert(digest, offset);
        Ok(offset)
    }

    /// Compress and write the store, temp file + rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        let compressed = zstd::encode_all(&self.data[..], ZSTD_LEVEL)
            .map_err(|e| TaxoniqError::Build(format!("zstd: {e}")))?;
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        let tmp = path.with_file_name(name);
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&compressed)?;
            out.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for BlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: &[&str]) -> (Vec<u32>, StringBlob) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strings.zstd");
        let mut builder = BlobBuilder::new();
        let offsets = values
            .iter()
            .map(|v| builder.append(v).unwrap())
            .collect();
        builder.write(&path).unwrap();
        (offsets, StringBlob::open(&path).unwrap())
    }

    #[test]
    fn get_returns_each_payload() {
        let (offsets, blob) = roundtrip(&["Escherichia coli", "Homo sapiens"]);
        assert_eq!(blob.get(offsets[0]).unwrap(), "Escherichia coli");
        assert_eq!(blob.get(offsets[1]).unwrap(), "Homo sapiens");
    }

    #[test]
    fn identical_payloads_share_an_offset() {
        let (offsets, blob) = roundtrip(&["bacteria", "vertebrates", "bacteria"]);
        assert_eq!(offsets[0], offsets[2]);
        assert_ne!(offsets[0], offsets[1]);
        assert_eq!(blob.get(offsets[2]).unwrap(), "bacteria");
    }

    #[test]
    fn interior_newlines_become_spaces() {
        let (offsets, blob) = roundtrip(&["two\nlines"]);
        assert_eq!(blob.get(offsets[0]).unwrap(), "two lines");
    }

    #[test]
    fn offset_past_end_is_corrupt_index() {
        let (_, blob) = roundtrip(&["x"]);
        assert!(matches!(
            blob.get(10_000),
            Err(TaxoniqError::CorruptIndex(_))
        ));
    }
}
