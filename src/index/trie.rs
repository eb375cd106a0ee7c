//! Memory-mapped string-key → fixed-record index.
//!
//! One file holds an `fst` automaton mapping each key to an offset into a
//! payload region of length-prefixed record bytes. Lookup is a prefix walk
//! over the automaton followed by one bounds-checked slice. The file is
//! mapped read-only and shared; nothing is ever written after build.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::schema::{Record, Schema};
use crate::{Result, TaxoniqError};

const MAGIC: &[u8; 4] = b"TXQI";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// A shared window into the mapped file, used to hand the fst region to
/// `fst::Map` without copying it out of the mapping.
#[derive(Clone)]
struct MmapSlice {
    mmap: Arc<Mmap>,
    start: usize,
    len: usize,
}

impl AsRef<[u8]> for MmapSlice {
    fn as_ref(&self) -> &[u8] {
        &self.mmap[self.start..self.start + self.len]
    }
}

/// Read-only key→record index.
pub struct Trie {
    schema: Schema,
    map: fst::Map<MmapSlice>,
    mmap: Arc<Mmap>,
    payload_start: usize,
    payload_len: usize,
}

impl Trie {
    /// Map `path` read-only and validate its header. The schema is declared
    /// by the caller; the file stores only raw record bytes.
    pub fn open(path: &Path, schema: Schema) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });
        if mmap.len() < HEADER_LEN {
            return Err(corrupt(path, "file shorter than header"));
        }
        if &mmap[..4] != MAGIC {
            return Err(corrupt(path, "bad magic"));
        }
        let version = LittleEndian::read_u32(&mmap[4..8]);
        if version != VERSION {
            return Err(corrupt(path, &format!("unsupported version {version}")));
        }
        let fst_len = LittleEndian::read_u64(&mmap[8..16]) as usize;
        let payload_len = LittleEndian::read_u64(&mmap[16..24]) as usize;
        let expected = HEADER_LEN
            .checked_add(fst_len)
            .and_then(|n| n.checked_add(payload_len));
        if expected != Some(mmap.len()) {
            return Err(corrupt(path, "section lengths disagree with file size"));
        }
        let fst_slice = MmapSlice {
            mmap: Arc::clone(&mmap),
            start: HEADER_LEN,
            len: fst_len,
        };
        let map = fst::Map::new(fst_slice)
            .map_err(|e| corrupt(path, &format!("bad key automaton: {e}")))?;
        Ok(Trie {
            schema,
            map,
            mmap,
            payload_start: HEADER_LEN + fst_len,
            payload_len,
        })
    }

    /// All records stored under `key`, or `None` if the key is absent.
    pub fn lookup(&self, key: &str) -> Result<Option<Records<'_>>> {
        let Some(offset) = self.map.get(key.as_bytes()) else {
            return Ok(None);
        };
        let offset = offset as usize;
        let payload = &self.mmap[self.payload_start..self.payload_start + self.payload_len];
        if offset >= payload.len() || payload.len() - offset < 4 {
            return Err(TaxoniqError::CorruptIndex(format!(
                "record offset {offset} out of range for key {key:?}"
            )));
        }
        let len = LittleEndian::read_u32(&payload[offset..offset + 4]) as usize;
        let start = offset + 4;
        if start + len > payload.len() {
            return Err(TaxoniqError::CorruptIndex(format!(
                "record payload for key {key:?} overruns the file"
            )));
        }
        let bytes = &payload[start..start + len];
        if len % self.schema.record_size() != 0 {
            return Err(TaxoniqError::CorruptIndex(format!(
                "payload length {len} for key {key:?} is not a multiple of the record size {}",
                self.schema.record_size()
            )));
        }
        Ok(Some(Records {
            schema: self.schema,
            bytes,
        }))
    }

    /// The first record for `key`. All taxoniq indexes store exactly one
    /// record per key, so this is the common accessor.
    pub fn first(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.lookup(key)?.map(|records| records.get(0)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key.as_bytes())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Decoded view of the records stored under one key.
pub struct Records<'a> {
    schema: Schema,
    bytes: &'a [u8],
}

impl<'a> Records<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len() / self.schema.record_size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Record {
        let size = self.schema.record_size();
        self.schema.decode(&self.bytes[index * size..(index + 1) * size])
    }

    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }
}

/// Accumulates `(key, record)` pairs and writes the final index atomically.
///
/// Input order is free; keys are sorted on write. Inserting the same key
/// again appends another record under it.
pub struct TrieBuilder {
    schema: Schema,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl TrieBuilder {
    pub fn new(schema: Schema) -> Self {
        TrieBuilder {
            schema,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, values: &[u64]) {
        let payload = self.entries.entry(key.as_bytes().to_vec()).or_default();
        self.schema.encode_into(values, payload);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the index to `path`, going through a temporary file in the
    /// same directory so readers never observe a partial index.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut payloads: Vec<u8> = Vec::new();
        let mut fst_builder = fst::MapBuilder::memory();
        for (key, payload) in &self.entries {
            let offset = payloads.len() as u64;
            payloads.write_u32::<LittleEndian>(payload.len() as u32)?;
            payloads.extend_from_slice(payload);
            fst_builder
                .insert(key, offset)
                .map_err(|e| TaxoniqError::Build(format!("key automaton: {e}")))?;
        }
        let fst_bytes = fst_builder
            .into_inner()
            .map_err(|e| TaxoniqError::Build(format!("key automaton: {e}")))?;

        let tmp = tmp_path(path);
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            out.write_all(MAGIC)?;
            out.write_u32::<LittleEndian>(VERSION)?;
            out.write_u64::<LittleEndian>(fst_bytes.len() as u64)?;
            out.write_u64::<LittleEndian>(payloads.len() as u64)?;
            out.write_all(&fst_bytes)?;
            out.write_all(&payloads)?;
            out.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn corrupt(path: &Path, detail: &str) -> TaxoniqError {
    TaxoniqError::CorruptIndex(format!("{}: {detail}", path.display()))
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    const PAIR: Schema = Schema::new(&[Field::U32, Field::U16]);
    const ONE: Schema = Schema::new(&[Field::U32]);

    fn build(dir: &Path, name: &str, schema: Schema, rows: &[(&str, &[u64])]) -> Trie {
        let mut builder = TrieBuilder::new(schema);
        for (key, values) in rows {
            builder.insert(key, values);
        }
        let path = dir.join(name);
        builder.write(&path).unwrap();
        Trie::open(&path, schema).unwrap()
    }

    #[test]
    fn lookup_returns_inserted_records() {
        let dir = tempfile::tempdir().unwrap();
        let trie = build(
            dir.path(),
            "pairs",
            PAIR,
            &[("NC0009133", &[511145, 0x0400]), ("AB0408741", &[2560602, 0x0001])],
        );
        let record = trie.first("NC0009133").unwrap().unwrap();
        assert_eq!(record.values(), &[511145, 0x0400]);
        assert!(trie.contains("AB0408741"));
        assert_eq!(trie.len(), 2);
        assert!(trie.first("NC0000000").unwrap().is_none());
    }

    #[test]
    fn duplicate_keys_accumulate_records() {
        let dir = tempfile::tempdir().unwrap();
        let trie = build(dir.path(), "multi", ONE, &[("9606", &[1]), ("9606", &[2])]);
        let records = trie.lookup("9606").unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.get(0).get(0), 1);
        assert_eq!(records.get(1).get(0), 2);
    }

    #[test]
    fn schema_mismatch_is_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = TrieBuilder::new(PAIR);
        builder.insert("k", &[7, 7]);
        let path = dir.path().join("pairs");
        builder.write(&path).unwrap();

        // Payload is 6 bytes per record; a 4-byte schema does not divide it.
        let trie = Trie::open(&path, ONE).unwrap();
        assert!(matches!(
            trie.lookup("k"),
            Err(TaxoniqError::CorruptIndex(_))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        fs::write(&path, b"TXQI\x01\x00").unwrap();
        assert!(matches!(
            Trie::open(&path, ONE),
            Err(TaxoniqError::CorruptIndex(_))
        ));
    }
}
