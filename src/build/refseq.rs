//! RefSeq genome accession ingest.
//!
//! Reads the RefSeq assembly summary, picks the best major-release assembly
//! per taxon, pulls each assembly report, and records the genbank
//! accessions of its assembled molecules.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::accession::pack_id;
use crate::db::ACCESSION_SCHEMA;
use crate::fetch;
use crate::index::Trie;
use crate::{Result, TaxoniqError};

const ASSEMBLY_SUMMARY_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/genomes/refseq/assembly_summary_refseq.txt";

/// One row of `assembly_summary_refseq.txt`, reduced to the fields the
/// selection uses.
#[derive(Debug, Clone)]
pub struct AssemblySummary {
    pub assembly_accession: String,
    pub refseq_category: String,
    pub taxid: u32,
    pub organism_name: String,
    pub assembly_level: String,
    pub release_type: String,
    pub genome_rep: String,
    pub seq_rel_date: String,
    pub ftp_path: String,
}

impl AssemblySummary {
    fn parse(line: &str) -> Option<AssemblySummary> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 20 {
            return None;
        }
        Some(AssemblySummary {
            assembly_accession: fields[0].to_string(),
            refseq_category: fields[4].to_string(),
            taxid: fields[5].parse().ok()?,
            organism_name: fields[7].to_string(),
            assembly_level: fields[11].to_string(),
            release_type: fields[12].to_string(),
            genome_rep: fields[13].to_string(),
            seq_rel_date: fields[14].to_string(),
            ftp_path: fields[19].to_string(),
        })
    }

    /// Selection key: category, then assembly level, then genome
    /// representation, then release date; the maximum wins.
    fn sort_key(&self) -> (u8, u8, u8, &str) {
        let category = match self.refseq_category.as_str() {
            "reference genome" => 2,
            "representative genome" => 1,
            _ => 0,
        };
        let level = match self.assembly_level.as_str() {
            "Complete Genome" => 3,
            "Chromosome" => 2,
            "Scaffold" => 1,
            _ => 0,
        };
        let rep = u8::from(self.genome_rep == "Full");
        (category, level, rep, &self.seq_rel_date)
    }

    fn report_url(&self) -> String {
        let https_path = self.ftp_path.replacen("ftp", "https", 1);
        let basename = https_path.rsplit('/').next().unwrap_or_default();
        format!("{https_path}/{basename}_assembly_report.txt")
    }
}

/// Download `url` into `cache_dir` unless already present.
fn fetch_cached(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let basename = url.rsplit('/').next().unwrap_or("download");
    let local = cache_dir.join(basename);
    if local.exists() {
        return Ok(local);
    }
    let response = fetch::client().get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(TaxoniqError::NetworkStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let body = response.bytes()?;
    let tmp = local.with_extension("tmp");
    fs::write(&tmp, &body)?;
    fs::rename(&tmp, &local)?;
    Ok(local)
}

/// Genbank accessions of the assembled molecules in one assembly report.
fn assembled_molecules(summary: &AssemblySummary, cache_dir: &Path) -> Result<Vec<String>> {
    let report = fetch_cached(&summary.report_url(), cache_dir)?;
    let reader = BufReader::new(File::open(report)?);
    let mut accessions = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < 5 || fields[1] != "assembled-molecule" {
            continue;
        }
        accessions.push(fields[4].to_string());
    }
    Ok(accessions)
}

/// Build the per-taxon RefSeq genome accession table and write it as the
/// `taxid2refseq` string index in `destdir`.
///
/// When `accessions_index` is given, only accessions present in it are
/// recorded, matching what the sequence mirror can actually serve.
pub fn build_refseq_index(
    destdir: &Path,
    cache_dir: &Path,
    accessions_index: Option<&Path>,
    organism_whitelist: &[String],
) -> Result<()> {
    fs::create_dir_all(cache_dir)?;
    let summary_path = fetch_cached(ASSEMBLY_SUMMARY_URL, cache_dir)?;
    let accessions_trie = accessions_index
        .map(|path| Trie::open(path, ACCESSION_SCHEMA))
        .transpose()?;

    let mut best: BTreeMap<u32, AssemblySummary> = BTreeMap::new();
    let reader = BufReader::new(File::open(summary_path)?);
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let Some(summary) = AssemblySummary::parse(&line) else {
            continue;
        };
        if summary.release_type != "Major" {
            continue;
        }
        if !organism_whitelist.is_empty()
            && !organism_whitelist.contains(&summary.organism_name)
        {
            continue;
        }
        let replace = match best.get(&summary.taxid) {
            Some(current) => summary.sort_key() > current.sort_key(),
            None => true,
        };
        if replace {
            best.insert(summary.taxid, summary);
        }
    }
    info!(assemblies = best.len(), "selected assemblies");

    let results: Vec<(u32, Result<Vec<String>>)> = best
        .par_iter()
        .map(|(&taxid, summary)| (taxid, assembled_molecules(summary, cache_dir)))
        .collect();

    let mut found = 0usize;
    let mut missing = 0usize;
    let mut taxid2accns: BTreeMap<u32, String> = BTreeMap::new();
    for (taxid, molecules) in results {
        let mut kept: Vec<String> = Vec::new();
        for accession in molecules? {
            let accession = accession
                .strip_suffix(".1")
                .map(str::to_string)
                .unwrap_or(accession);
            let in_index = match &accessions_trie {
                Some(trie) => trie.contains(&pack_id(&accession)),
                None => true,
            };
            if in_index {
                kept.push(accession);
                found += 1;
            } else {
                missing += 1;
            }
        }
        if !kept.is_empty() {
            kept.sort();
            taxid2accns.insert(taxid, kept.join(","));
        }
    }
    if missing > 0 {
        warn!(found, missing, "some genbank accessions absent from the accession index");
    }

    super::write_string_index(
        destdir,
        "taxid2refseq",
        taxid2accns
            .into_iter()
            .map(|(taxid, accns)| (taxid.to_string(), accns)),
    )
}

/// Organism whitelist from a comma-separated environment value.
pub fn parse_whitelist(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
