//! Lazily opened, immutable handles to the on-disk index artifacts.
//!
//! A [`Database`] is a cheap-to-clone handle over the artifact directory;
//! each index or string store opens at most once, publishing a shared
//! read-only value. The process-wide default instance lives behind
//! [`Database::shared`]; tests that need isolation open their own instance
//! against a fixture directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::accession::Accession;
use crate::index::{StringBlob, Trie};
use crate::schema::{Field, Schema};
use crate::taxon::Taxon;
use crate::{Result, TaxoniqError};

/// Release stamp of the taxonomy dump the bundled artifacts were built from.
pub const TAXONOMY_DB_TIMESTAMP: &str = "2024-06-15";

/// S3/GCS mirror prefix of the BLAST database snapshot the accession
/// offsets were built against.
pub const BLAST_DB_TIMESTAMP: &str = "2024-06-15-01-05-02";

/// Record layout of the taxa index: parent, rank, division, species flag.
pub(crate) const TAXA_SCHEMA: Schema =
    Schema::new(&[Field::U32, Field::U8, Field::U8, Field::U8]);

/// Record layout of all single-integer indexes (ids, offsets, lengths).
pub(crate) const ID_SCHEMA: Schema = Schema::new(&[Field::U32]);

/// Record layout of the accession index: tax_id, packed db+volume.
pub(crate) const ACCESSION_SCHEMA: Schema = Schema::new(&[Field::U32, Field::U16]);

/// A string attribute carried per taxon in a position trie + blob pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    ScientificName,
    CommonName,
    Description,
    EnWikiTitle,
    ChildNodes,
    Host,
    RefseqRepresentative,
    Refseq,
}

impl Attr {
    /// File stem of the artifact pair (`<stem>.marisa` + `<stem>.zstd`).
    pub fn file_stem(self) -> &'static str {
        match self {
            Attr::ScientificName => "scientific_name",
            Attr::CommonName => "common_name",
            Attr::Description => "description",
            Attr::EnWikiTitle => "en_wiki_title",
            Attr::ChildNodes => "child_nodes",
            Attr::Host => "host",
            Attr::RefseqRepresentative => "taxid2refrep",
            Attr::Refseq => "taxid2refseq",
        }
    }
}

const ATTR_COUNT: usize = 8;

/// Position trie + decompressed string store for one attribute.
struct StringIndex {
    positions: Trie,
    strings: StringBlob,
}

impl StringIndex {
    fn open(dir: &Path, stem: &str) -> Result<Self> {
        Ok(StringIndex {
            positions: Trie::open(&dir.join(format!("{stem}.marisa")), ID_SCHEMA)?,
            strings: StringBlob::open(&dir.join(format!("{stem}.zstd")))?,
        })
    }

    fn get(&self, key: &str) -> Result<Option<&str>> {
        match self.positions.first(key)? {
            Some(record) => Ok(Some(self.strings.get(record.get(0) as u32)?)),
            None => Ok(None),
        }
    }
}

struct Inner {
    dir: PathBuf,
    taxa: OnceLock<Trie>,
    sn2taxid: OnceLock<Trie>,
    wikidata: OnceLock<Trie>,
    accessions: OnceLock<Trie>,
    accession_offsets: OnceLock<Trie>,
    accession_lengths: OnceLock<Trie>,
    attrs: [OnceLock<StringIndex>; ATTR_COUNT],
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    pub fn open(dir: impl Into<PathBuf>) -> Database {
        Database {
            inner: Arc::new(Inner {
                dir: dir.into(),
                taxa: OnceLock::new(),
                sn2taxid: OnceLock::new(),
                wikidata: OnceLock::new(),
                accessions: OnceLock::new(),
                accession_offsets: OnceLock::new(),
                accession_lengths: OnceLock::new(),
                attrs: Default::default(),
            }),
        }
    }

    /// The process-wide default database, rooted at `$TAXONIQ_DB` or the
    /// per-user data directory.
    pub fn shared() -> Database {
        static SHARED: OnceLock<Database> = OnceLock::new();
        SHARED.get_or_init(|| Database::open(default_dir())).clone()
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn open_lazy<'a, T>(
        cell: &'a OnceLock<T>,
        open: impl FnOnce() -> Result<T>,
    ) -> Result<&'a T> {
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let value = open()?;
        Ok(cell.get_or_init(|| value))
    }

    pub(crate) fn taxa(&self) -> Result<&Trie> {
        let dir = &self.inner.dir;
        Self::open_lazy(&self.inner.taxa, || {
            Trie::open(&dir.join("taxa.marisa"), TAXA_SCHEMA)
        })
    }

    pub(crate) fn sn2taxid(&self) -> Result<&Trie> {
        let dir = &self.inner.dir;
        Self::open_lazy(&self.inner.sn2taxid, || {
            Trie::open(&dir.join("sn2taxid.marisa"), ID_SCHEMA)
        })
    }

    pub(crate) fn accessions(&self) -> Result<&Trie> {
        let dir = &self.inner.dir;
        Self::open_lazy(&self.inner.accessions, || {
            Trie::open(&dir.join("accessions").join("db.marisa"), ACCESSION_SCHEMA)
        })
    }

    pub(crate) fn accession_offsets(&self) -> Result<&Trie> {
        let dir = &self.inner.dir;
        Self::open_lazy(&self.inner.accession_offsets, || {
            Trie::open(&dir.join("accession_offsets").join("db.marisa"), ID_SCHEMA)
        })
    }

    pub(crate) fn accession_lengths(&self) -> Result<&Trie> {
        let dir = &self.inner.dir;
        Self::open_lazy(&self.inner.accession_lengths, || {
            Trie::open(&dir.join("accession_lengths").join("db.marisa"), ID_SCHEMA)
        })
    }

    /// The attribute value recorded for `tax_id`, if any.
    pub(crate) fn attr(&self, attr: Attr, tax_id: u32) -> Result<Option<&str>> {
        let dir = &self.inner.dir;
        let cell = &self.inner.attrs[attr as usize];
        let index = Self::open_lazy(cell, || StringIndex::open(dir, attr.file_stem()))?;
        index.get(&tax_id.to_string())
    }

    /// The wikidata item number recorded for `tax_id`, if any.
    pub(crate) fn wikidata_id(&self, tax_id: u32) -> Result<Option<u32>> {
        let dir = &self.inner.dir;
        let trie = Self::open_lazy(&self.inner.wikidata, || {
            Trie::open(&dir.join("wikidata.marisa"), ID_SCHEMA)
        })?;
        Ok(trie
            .first(&tax_id.to_string())?
            .map(|record| record.get(0) as u32))
    }

    pub fn taxon(&self, tax_id: u32) -> Result<Taxon> {
        Taxon::new(self.clone(), tax_id)
    }

    pub fn taxon_by_scientific_name(&self, name: &str) -> Result<Taxon> {
        let record = self
            .sn2taxid()?
            .first(name)?
            .ok_or_else(|| TaxoniqError::NotFound(name.to_string()))?;
        self.taxon(record.get(0) as u32)
    }

    pub fn taxon_by_accession(&self, accession_id: &str) -> Result<Taxon> {
        let tax_id = self.accession(accession_id).tax_id()?;
        self.taxon(tax_id)
    }

    pub fn accession(&self, accession_id: &str) -> Accession {
        Accession::with_db(self.clone(), accession_id)
    }
}

fn default_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("TAXONIQ_DB") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taxoniq")
        .join("db")
}
