//! One-shot offline construction of the index artifacts.
//!
//! Ingests the NCBI taxdump, local BLAST database volumes, the RefSeq
//! assembly summary, and a previously harvested Wikipedia extract file,
//! and writes the immutable tries and string blobs the query side maps.

pub mod accessions;
pub mod refseq;
pub mod taxdump;
pub mod wiki;

use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::db::{ACCESSION_SCHEMA, ID_SCHEMA, TAXA_SCHEMA};
use crate::fetch;
use crate::index::{BlobBuilder, TrieBuilder};
use crate::rank::BlastDatabase;
use crate::{Result, TaxoniqError};

use self::taxdump::{HostReader, NamesReader, NodesReader};
use self::wiki::ExtractRecord;

const TAXDUMP_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/new_taxdump/new_taxdump.tar.gz";

/// Name classes carried into the name indexes.
const NAME_CLASSES: [&str; 4] = [
    "scientific name",
    "common name",
    "genbank common name",
    "blast name",
];

pub struct IndexBuildConfig {
    pub taxdump_dir: PathBuf,
    pub blastdb_dir: Option<PathBuf>,
    pub databases: Vec<BlastDatabase>,
    pub wikipedia_extracts: Option<PathBuf>,
    pub destdir: PathBuf,
}

/// Build every artifact the query side reads.
pub fn build_index(config: &IndexBuildConfig) -> Result<()> {
    fs::create_dir_all(&config.destdir)?;
    ensure_taxdump(&config.taxdump_dir)?;

    if let Some(extracts) = &config.wikipedia_extracts {
        build_wikidata_indexes(extracts, &config.destdir)?;
    }
    build_taxa_index(&config.taxdump_dir, &config.destdir)?;
    build_name_indexes(&config.taxdump_dir, &config.destdir)?;
    build_host_index(&config.taxdump_dir, &config.destdir)?;
    if let Some(blastdb_dir) = &config.blastdb_dir {
        build_accession_indexes(blastdb_dir, &config.databases, &config.destdir)?;
    }
    info!(destdir = %config.destdir.display(), "index build complete");
    Ok(())
}

/// Download and unpack the taxdump tarball unless `nodes.dmp` is present.
pub fn ensure_taxdump(dir: &Path) -> Result<()> {
    if dir.join("nodes.dmp").exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    info!(url = TAXDUMP_URL, "downloading taxonomy dump");
    let response = fetch::client().get(TAXDUMP_URL).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(TaxoniqError::NetworkStatus {
            status: status.as_u16(),
            url: TAXDUMP_URL.to_string(),
        });
    }
    tar::Archive::new(GzDecoder::new(response)).unpack(dir)?;
    Ok(())
}

/// Write one position-trie + blob pair under `destdir`.
pub(crate) fn write_string_index(
    destdir: &Path,
    name: &str,
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<()> {
    info!(name, "writing string index");
    let mut blob = BlobBuilder::new();
    let mut positions = TrieBuilder::new(ID_SCHEMA);
    for (key, value) in pairs {
        let offset = blob.append(&value)?;
        positions.insert(&key, &[u64::from(offset)]);
    }
    blob.write(&destdir.join(format!("{name}.zstd")))?;
    positions.write(&destdir.join(format!("{name}.marisa")))?;
    Ok(())
}

fn load_extracts(path: &Path) -> Result<Vec<ExtractRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(
            serde_json::from_str::<ExtractRecord>(&line)
                .map_err(|e| TaxoniqError::Build(format!("bad extract record: {e}")))?,
        );
    }
    Ok(records)
}

fn build_wikidata_indexes(extracts: &Path, destdir: &Path) -> Result<()> {
    let records = load_extracts(extracts)?;
    info!(records = records.len(), "loaded wikipedia extract records");

    let mut wikidata = TrieBuilder::new(ID_SCHEMA);
    for record in &records {
        let item: u32 = record
            .wikidata_id
            .trim_start_matches('Q')
            .parse()
            .map_err(|_| {
                TaxoniqError::Build(format!("bad wikidata id {:?}", record.wikidata_id))
            })?;
        wikidata.insert(&record.taxid, &[u64::from(item)]);
    }
    wikidata.write(&destdir.join("wikidata.marisa"))?;

    write_string_index(
        destdir,
        "description",
        records
            .iter()
            .filter_map(|r| r.extract.clone().map(|e| (r.taxid.clone(), e))),
    )?;
    write_string_index(
        destdir,
        "en_wiki_title",
        records
            .iter()
            .map(|r| (r.taxid.clone(), r.en_wiki_title.clone())),
    )
}

fn build_taxa_index(taxdump_dir: &Path, destdir: &Path) -> Result<()> {
    let mut taxa = TrieBuilder::new(TAXA_SCHEMA);
    let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut rows = 0u64;
    for row in NodesReader::open(taxdump_dir)? {
        let row = row?;
        taxa.insert(
            &row.tax_id.to_string(),
            &[
                u64::from(row.parent),
                u64::from(row.rank.id()),
                u64::from(row.division_id),
                u64::from(row.specified_species),
            ],
        );
        if row.tax_id != row.parent {
            children.entry(row.parent).or_default().push(row.tax_id);
        }
        rows += 1;
        if rows % 100_000 == 0 {
            info!(rows, "processed taxon rows");
        }
    }
    info!(rows, "writing taxa index");
    taxa.write(&destdir.join("taxa.marisa"))?;

    write_string_index(
        destdir,
        "child_nodes",
        children.into_iter().map(|(parent, mut ids)| {
            ids.sort_unstable();
            (
                parent.to_string(),
                ids.iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }),
    )
}

fn build_name_indexes(taxdump_dir: &Path, destdir: &Path) -> Result<()> {
    // First occurrence per (taxon, class) wins, as in the dump's own order.
    let mut names: BTreeMap<u32, BTreeMap<&'static str, String>> = BTreeMap::new();
    let mut sn2taxid = TrieBuilder::new(ID_SCHEMA);
    for row in NamesReader::open(taxdump_dir)? {
        let row = row?;
        let Some(&class) = NAME_CLASSES.iter().find(|&&c| c == row.name_class) else {
            continue;
        };
        let classes = names.entry(row.tax_id).or_default();
        if classes.contains_key(class) {
            continue;
        }
        if class == "scientific name" {
            sn2taxid.insert(&row.name, &[u64::from(row.tax_id)]);
        }
        classes.insert(class, row.name);
    }
    sn2taxid.write(&destdir.join("sn2taxid.marisa"))?;

    // Scientific names are written in name order so shared prefixes sit
    // together in the blob.
    let mut by_name: Vec<(u32, String)> = names
        .iter()
        .filter_map(|(&tax_id, classes)| {
            classes.get("scientific name").map(|n| (tax_id, n.clone()))
        })
        .collect();
    by_name.sort_by(|a, b| a.1.cmp(&b.1));
    write_string_index(
        destdir,
        "scientific_name",
        by_name.into_iter().map(|(tid, name)| (tid.to_string(), name)),
    )?;

    write_string_index(
        destdir,
        "common_name",
        names.iter().filter_map(|(&tax_id, classes)| {
            ["blast name", "genbank common name", "common name"]
                .iter()
                .find_map(|class| classes.get(*class))
                .map(|name| (tax_id.to_string(), name.clone()))
        }),
    )
}

fn build_host_index(taxdump_dir: &Path, destdir: &Path) -> Result<()> {
    let host_table = taxdump_dir.join("host.dmp");
    if !host_table.exists() {
        info!("no host.dmp in taxdump, writing empty host index");
        return write_string_index(destdir, "host", std::iter::empty());
    }
    let mut rows = Vec::new();
    for row in HostReader::open(taxdump_dir)? {
        let row = row?;
        rows.push((row.tax_id.to_string(), row.potential_hosts));
    }
    write_string_index(destdir, "host", rows)
}

fn build_accession_indexes(
    blastdb_dir: &Path,
    databases: &[BlastDatabase],
    destdir: &Path,
) -> Result<()> {
    let cache = blastdb_dir.join("accession_cache");
    accessions::write_accession_cache(blastdb_dir, databases, &cache)?;

    let mut acc = TrieBuilder::new(ACCESSION_SCHEMA);
    let mut offsets = TrieBuilder::new(ID_SCHEMA);
    let mut lengths = TrieBuilder::new(ID_SCHEMA);
    let mut refrep: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for info in accessions::read_accession_cache(&cache)? {
        let info = info?;
        acc.insert(
            &info.packed_id,
            &[u64::from(info.tax_id), u64::from(info.db_info()?)],
        );
        offsets.insert(&info.packed_id, &[u64::from(info.offset)]);
        lengths.insert(&info.packed_id, &[u64::from(info.length)]);
        if BlastDatabase::from_name(&info.db_name).is_some_and(BlastDatabase::is_refseq) {
            refrep
                .entry(info.tax_id)
                .or_default()
                .push(info.accession_id);
        }
    }

    for (subdir, builder) in [
        ("accessions", &acc),
        ("accession_offsets", &offsets),
        ("accession_lengths", &lengths),
    ] {
        let dir = destdir.join(subdir);
        fs::create_dir_all(&dir)?;
        builder.write(&dir.join("db.marisa"))?;
        info!(index = subdir, keys = builder.len(), "wrote accession index");
    }

    write_string_index(
        destdir,
        "taxid2refrep",
        refrep
            .into_iter()
            .map(|(tax_id, accns)| (tax_id.to_string(), accns.join(","))),
    )
}
