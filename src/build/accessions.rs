//! Accession enumeration from local BLAST database volumes.
//!
//! `blastdbcmd` lists each volume's accessions with their ordinal ids,
//! lengths, and taxonomy assignments; the volume's `.nin` header resolves
//! ordinal ids to byte offsets in the `.nsq` payload.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::accession::pack_id;
use crate::blastdb::VolumeHeader;
use crate::rank::BlastDatabase;
use crate::{Result, TaxoniqError};

/// Size of the sparse `.nsq` placeholder created so `blastdbcmd` accepts
/// volumes whose sequence payload was not downloaded.
const PLACEHOLDER_NSQ_LEN: u64 = 8 << 30;

/// One accession's placement, as cached between the enumeration pass and
/// the index writes (newline-delimited JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessionInfo {
    pub accession_id: String,
    pub packed_id: String,
    pub tax_id: u32,
    pub db_name: String,
    pub volume_id: u8,
    pub offset: u32,
    pub length: u32,
}

impl AccessionInfo {
    /// The packed database+volume record value.
    pub fn db_info(&self) -> Result<u16> {
        let db = BlastDatabase::from_name(&self.db_name).ok_or_else(|| {
            TaxoniqError::Build(format!("unknown BLAST database {:?}", self.db_name))
        })?;
        Ok((u16::from(db.id()) << 8) | u16::from(self.volume_id))
    }
}

/// Volumes of `db` under `blastdb_dir`, according to `blastdbcmd -list`.
pub fn list_database_volumes(blastdb_dir: &Path, db: BlastDatabase) -> Result<Vec<PathBuf>> {
    let output = Command::new("blastdbcmd")
        .arg("-list")
        .arg(blastdb_dir)
        .output()?;
    if !output.status.success() {
        return Err(TaxoniqError::Build(format!(
            "blastdbcmd -list failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let mut volumes = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let Some((path, _db_type)) = line.trim().rsplit_once(' ') else {
            continue;
        };
        let path = Path::new(path.trim());
        let Ok(relative) = path.strip_prefix(blastdb_dir) else {
            continue;
        };
        let name = relative.to_string_lossy();
        if name == db.as_str() || name.starts_with(&format!("{}.", db.as_str())) {
            ensure_placeholder_nsq(path)?;
            volumes.push(path.to_path_buf());
        }
    }
    volumes.sort();
    Ok(volumes)
}

/// Append `.nin`/`.nsq` to a volume path. Volume names carry their ordinal
/// as a dotted suffix (`nt.042`), so `Path::with_extension` would clobber it.
fn volume_file(volume: &Path, suffix: &str) -> PathBuf {
    let mut name = volume.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Create a sparse `.nsq` next to the volume when the real payload is
/// absent; `blastdbcmd` refuses to open a volume without one.
fn ensure_placeholder_nsq(volume: &Path) -> Result<()> {
    let nsq = volume_file(volume, ".nsq");
    if nsq.exists() {
        return Ok(());
    }
    let file = OpenOptions::new().write(true).create(true).open(&nsq)?;
    file.set_len(PLACEHOLDER_NSQ_LEN)?;
    debug!(path = %nsq.display(), "created placeholder sequence file");
    Ok(())
}

/// All accessions of one database, joined with their payload offsets.
/// Volumes without a readable `.nin` are skipped.
pub fn load_database(blastdb_dir: &Path, db: BlastDatabase) -> Result<Vec<AccessionInfo>> {
    let mut accessions = Vec::new();
    for volume in list_database_volumes(blastdb_dir, db)? {
        let nin = volume_file(&volume, ".nin");
        if !nin.exists() {
            continue;
        }
        info!(volume = %volume.display(), "processing BLAST db volume");
        let header = VolumeHeader::read(&nin)?;
        info!(
            title = %header.title,
            date = %header.create_date,
            records = header.num_oids,
            "volume header"
        );
        let volume_id = volume_id_of(&volume);
        for entry in enumerate_volume(blastdb_dir, &volume)? {
            let offset = header.sequence_offset(entry.ordinal_id)?;
            accessions.push(AccessionInfo {
                packed_id: pack_id(&entry.accession_id),
                accession_id: entry.accession_id,
                tax_id: entry.tax_id,
                db_name: db.as_str().to_string(),
                volume_id,
                offset,
                length: entry.length,
            });
        }
    }
    Ok(accessions)
}

/// The numeric suffix of a volume path (`nt.042` → 42), 0 when absent.
fn volume_id_of(volume: &Path) -> u8 {
    volume
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<u8>().ok())
        .unwrap_or(0)
}

struct VolumeEntry {
    accession_id: String,
    ordinal_id: u32,
    length: u32,
    tax_id: u32,
}

fn enumerate_volume(blastdb_dir: &Path, volume: &Path) -> Result<Vec<VolumeEntry>> {
    let basename = volume
        .file_name()
        .ok_or_else(|| TaxoniqError::Build(format!("bad volume path {}", volume.display())))?;
    let output = Command::new("blastdbcmd")
        .arg("-db")
        .arg(basename)
        .args(["-entry", "all", "-outfmt", "%a %o %l %T"])
        .env("BLASTDB", blastdb_dir)
        .output()?;
    if !output.status.success() {
        return Err(TaxoniqError::Build(format!(
            "blastdbcmd -entry all failed for {}: {}",
            volume.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let mut entries = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(TaxoniqError::Build(format!(
                "unexpected blastdbcmd output line: {line:?}"
            )));
        }
        entries.push(VolumeEntry {
            accession_id: fields[0].to_string(),
            ordinal_id: parse_field(fields[1], "ordinal id")?,
            length: parse_field(fields[2], "length")?,
            tax_id: parse_field(fields[3], "tax id")?,
        });
    }
    Ok(entries)
}

fn parse_field(value: &str, what: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| TaxoniqError::Build(format!("bad {what} in blastdbcmd output: {value:?}")))
}

/// Enumerate every configured database into the JSON-lines cache,
/// deduplicating on packed id (first occurrence wins). Returns the cache
/// path for the index-writing pass.
pub fn write_accession_cache(
    blastdb_dir: &Path,
    databases: &[BlastDatabase],
    cache_path: &Path,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(cache_path)?);
    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates = 0usize;
    for &db in databases {
        let mut written = 0usize;
        for info in load_database(blastdb_dir, db)? {
            if !seen.insert(info.packed_id.clone()) {
                duplicates += 1;
                continue;
            }
            serde_json::to_writer(&mut out, &info)
                .map_err(|e| TaxoniqError::Build(format!("cache write: {e}")))?;
            out.write_all(b"\n")?;
            written += 1;
        }
        info!(db = db.as_str(), accessions = written, "processed database");
    }
    out.flush()?;
    info!(duplicates, total = seen.len(), "accession enumeration complete");
    Ok(())
}

/// Stream the cache back for the index-writing pass.
pub fn read_accession_cache(
    cache_path: &Path,
) -> Result<impl Iterator<Item = Result<AccessionInfo>>> {
    let reader = BufReader::new(File::open(cache_path)?);
    Ok(reader.lines().map(|line| {
        let line = line?;
        serde_json::from_str::<AccessionInfo>(&line)
            .map_err(|e| TaxoniqError::Build(format!("bad cache line: {e}")))
    }))
}
