//! Sequence accession queries: taxonomy assignment, BLAST volume placement,
//! and remote sequence retrieval.

use std::fmt;
use std::sync::OnceLock;

use crate::db::Database;
use crate::fetch::{self, Mirror, SequenceStream};
use crate::rank::BlastDatabase;
use crate::{Result, TaxoniqError};

/// A (possibly unresolved) NCBI nucleotide accession. Construction never
/// touches the index; each getter resolves lazily and caches its value.
#[derive(Clone)]
pub struct Accession {
    db: Database,
    id: String,
    packed_id: String,
    record: OnceLock<(u32, u16)>,
    offset: OnceLock<u32>,
    length: OnceLock<u32>,
}

impl Accession {
    pub fn new(accession_id: &str) -> Accession {
        Accession::with_db(Database::shared(), accession_id)
    }

    pub(crate) fn with_db(db: Database, accession_id: &str) -> Accession {
        Accession {
            db,
            packed_id: pack_id(accession_id),
            id: accession_id.to_string(),
            record: OnceLock::new(),
            offset: OnceLock::new(),
            length: OnceLock::new(),
        }
    }

    /// The accession id as supplied by the caller.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The canonical index key: trailing `.1` stripped, underscores elided.
    pub fn packed_id(&self) -> &str {
        &self.packed_id
    }

    pub fn tax_id(&self) -> Result<u32> {
        Ok(self.load_record()?.0)
    }

    /// The BLAST database holding this accession's sequence.
    pub fn blast_db(&self) -> Result<BlastDatabase> {
        let (_, db_info) = self.load_record()?;
        let db_id = (db_info >> 8) as u8;
        BlastDatabase::from_id(db_id).ok_or_else(|| {
            TaxoniqError::CorruptIndex(format!(
                "accession {} carries unknown database id {db_id}",
                self.id
            ))
        })
    }

    /// The volume of the BLAST database holding this accession's sequence.
    pub fn blast_db_volume(&self) -> Result<u8> {
        Ok((self.load_record()?.1 & 0xff) as u8)
    }

    /// Byte offset of the first sequence byte in the volume payload.
    pub fn db_offset(&self) -> Result<u32> {
        if let Some(&offset) = self.offset.get() {
            return Ok(offset);
        }
        let offset = self.lookup_u32(self.db.accession_offsets()?)?;
        Ok(*self.offset.get_or_init(|| offset))
    }

    /// Sequence length in bases.
    pub fn length(&self) -> Result<u32> {
        if let Some(&length) = self.length.get() {
            return Ok(length);
        }
        let length = self.lookup_u32(self.db.accession_lengths()?)?;
        Ok(*self.length.get_or_init(|| length))
    }

    /// Stream the nucleotide sequence from the AWS S3 mirror of the NCBI
    /// BLAST databases (https://registry.opendata.aws/ncbi-blast-databases/).
    /// The reader yields ASCII bases, exactly `length()` of them.
    pub fn get_from_s3(&self) -> Result<SequenceStream> {
        self.fetch(Mirror::S3)
    }

    /// Stream the nucleotide sequence from the GCS mirror (`blast-db`
    /// bucket).
    pub fn get_from_gs(&self) -> Result<SequenceStream> {
        self.fetch(Mirror::Gcs)
    }

    /// URL of the NCBI nucleotide page for this accession.
    pub fn url(&self) -> String {
        format!("https://www.ncbi.nlm.nih.gov/nuccore/{}", self.id)
    }

    fn fetch(&self, mirror: Mirror) -> Result<SequenceStream> {
        fetch::fetch_sequence(
            mirror,
            self.blast_db()?,
            self.blast_db_volume()?,
            self.db_offset()?,
            self.length()?,
        )
    }

    fn load_record(&self) -> Result<(u32, u16)> {
        if let Some(&record) = self.record.get() {
            return Ok(record);
        }
        let record = self
            .db
            .accessions()?
            .first(&self.packed_id)?
            .ok_or_else(|| TaxoniqError::NotFound(self.id.clone()))?;
        let value = (record.get(0) as u32, record.get(1) as u16);
        Ok(*self.record.get_or_init(|| value))
    }

    fn lookup_u32(&self, trie: &crate::index::Trie) -> Result<u32> {
        let record = trie
            .first(&self.packed_id)?
            .ok_or_else(|| TaxoniqError::NotFound(self.id.clone()))?;
        Ok(record.get(0) as u32)
    }
}

impl PartialEq for Accession {
    fn eq(&self, other: &Self) -> bool {
        self.packed_id == other.packed_id
    }
}

impl Eq for Accession {}

impl fmt::Debug for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Accession").field(&self.id).finish()
    }
}

/// Canonicalize an accession id for index lookup: strip a trailing `.1`
/// version suffix (only `.1`; other versions are kept) and drop all
/// underscores. Both index keys and caller-supplied ids go through this,
/// so any spelling of the same id resolves to the same key.
pub fn pack_id(accession_id: &str) -> String {
    let id = accession_id.strip_suffix(".1").unwrap_or(accession_id);
    id.replace('_', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_strips_version_one_and_underscores() {
        assert_eq!(pack_id("NC_000913.1"), "NC000913");
        assert_eq!(pack_id("NC_000913.3"), "NC000913.3");
        assert_eq!(pack_id("NC_000913"), "NC000913");
        assert_eq!(pack_id("AB040874.1"), "AB040874");
    }

    #[test]
    fn packing_is_idempotent() {
        for id in ["NC_000913.3", "NC_000913.1", "CP049118.1", "plainid"] {
            assert_eq!(pack_id(&pack_id(id)), pack_id(id));
        }
    }
}
