//! The `taxoniq` command: a thin dispatcher over the query library.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use serde_json::{json, Value};
use std::io::{self, BufWriter, Read, Write};

use crate::db::{BLAST_DB_TIMESTAMP, TAXONOMY_DB_TIMESTAMP};
use crate::{Accession, AttrValue, Taxon};

fn long_version() -> String {
    format!(
        "{} (taxonomy-db {TAXONOMY_DB_TIMESTAMP}, blast-db {BLAST_DB_TIMESTAMP})",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Parser)]
#[command(
    name = "taxoniq",
    version = long_version(),
    about = "Taxon Information Query - fast, offline querying of NCBI Taxonomy and related data",
    long_about = "Given a taxon ID, accession ID, or scientific name, look up taxonomy and \
                  sequence data from local indexes of the NCBI Taxonomy and BLAST databases. \
                  Sequences themselves are streamed from the public BLAST database mirrors."
)]
pub struct Cli {
    /// The attribute to look up, or a sequence retrieval operation
    #[arg(value_enum)]
    pub operation: Operation,

    /// Numeric NCBI taxon ID
    #[arg(long)]
    pub taxon_id: Option<u32>,

    /// Alphanumeric NCBI sequence accession ID ("-" reads accession IDs
    /// from standard input for get-from-s3/get-from-gs)
    #[arg(long)]
    pub accession_id: Option<String>,

    /// Unique scientific name of the taxon
    #[arg(long)]
    pub scientific_name: Option<String>,

    /// Format string applied to each taxon or accession in the result,
    /// e.g. "{scientific_name}"
    #[arg(long)]
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    TaxId,
    ScientificName,
    CommonName,
    Description,
    BestAvailableDescription,
    EnWikiTitle,
    Rank,
    Parent,
    Lineage,
    RankedLineage,
    ChildNodes,
    RankedChildNodes,
    Host,
    RefseqRepresentativeGenomeAccessions,
    RefseqGenomeAccessions,
    WikidataId,
    Url,
    WikidataUrl,
    Length,
    DbOffset,
    BlastDb,
    BlastDbVolume,
    GetFromS3,
    GetFromGs,
}

impl Operation {
    /// The taxon attribute name this operation reads, where applicable.
    fn attr_name(self) -> Option<&'static str> {
        Some(match self {
            Operation::TaxId => "tax_id",
            Operation::ScientificName => "scientific_name",
            Operation::CommonName => "common_name",
            Operation::Description => "description",
            Operation::BestAvailableDescription => "best_available_description",
            Operation::EnWikiTitle => "en_wiki_title",
            Operation::Rank => "rank",
            Operation::Parent => "parent",
            Operation::Lineage => "lineage",
            Operation::RankedLineage => "ranked_lineage",
            Operation::ChildNodes => "child_nodes",
            Operation::RankedChildNodes => "ranked_child_nodes",
            Operation::Host => "host",
            Operation::RefseqRepresentativeGenomeAccessions => {
                "refseq_representative_genome_accessions"
            }
            Operation::RefseqGenomeAccessions => "refseq_genome_accessions",
            Operation::WikidataId => "wikidata_id",
            Operation::Url => "url",
            Operation::WikidataUrl => "wikidata_url",
            _ => return None,
        })
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.operation {
        Operation::GetFromS3 | Operation::GetFromGs => run_sequence_fetch(&cli),
        Operation::Length | Operation::DbOffset | Operation::BlastDb | Operation::BlastDbVolume => {
            run_accession_query(&cli)
        }
        _ => run_taxon_query(&cli),
    }
}

fn run_taxon_query(cli: &Cli) -> anyhow::Result<()> {
    let taxon = Taxon::from_query(
        cli.taxon_id,
        cli.accession_id.as_deref(),
        cli.scientific_name.as_deref(),
    )?;
    let name = cli
        .operation
        .attr_name()
        .expect("taxon operations always map to an attribute");
    let value = taxon.get_attr(name)?;
    let rendered = render_json(&value, cli.output_format.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

fn run_accession_query(cli: &Cli) -> anyhow::Result<()> {
    let accession = require_accession(cli)?;
    let value = match cli.operation {
        Operation::Length => json!(accession.length()?),
        Operation::DbOffset => json!(accession.db_offset()?),
        Operation::BlastDb => json!(accession.blast_db()?.as_str()),
        Operation::BlastDbVolume => json!(accession.blast_db_volume()?),
        _ => unreachable!(),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_sequence_fetch(cli: &Cli) -> anyhow::Result<()> {
    let accession = require_accession(cli)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if accession.id() == "-" {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        let ids: Vec<&str> = input.lines().filter(|l| !l.trim().is_empty()).collect();

        // Fetches are network-bound, so the pool is wider than the CPU count.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads((num_cpus::get() + 4).min(32))
            .build()
            .context("building fetch thread pool")?;
        let sequences: Vec<(String, Vec<u8>)> = pool.install(|| {
            ids.par_iter()
                .map(|id| {
                    let accession = Accession::new(id);
                    let mut sequence = Vec::new();
                    fetch_stream(&accession, cli.operation)?.read_to_end(&mut sequence)?;
                    Ok((accession.id().to_string(), sequence))
                })
                .collect::<anyhow::Result<_>>()
        })?;
        for (id, sequence) in sequences {
            write_fasta(&mut out, &id, &sequence)?;
        }
    } else {
        writeln!(out, ">{}", accession.id())?;
        let mut writer = WrappedWriter::new(&mut out);
        let mut stream = fetch_stream(&accession, cli.operation)?;
        let mut chunk = [0u8; 16384];
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            writer.write_bases(&chunk[..n])?;
        }
        writer.finish()?;
    }
    out.flush()?;
    Ok(())
}

fn fetch_stream(
    accession: &Accession,
    operation: Operation,
) -> crate::Result<crate::fetch::SequenceStream> {
    match operation {
        Operation::GetFromGs => accession.get_from_gs(),
        _ => accession.get_from_s3(),
    }
}

fn require_accession(cli: &Cli) -> anyhow::Result<Accession> {
    if cli.taxon_id.is_some() || cli.scientific_name.is_some() {
        bail!("this operation requires --accession-id");
    }
    match cli.accession_id.as_deref() {
        Some(id) => Ok(Accession::new(id)),
        None => bail!("this operation requires --accession-id"),
    }
}

/// FASTA sequence lines wrapped at 64 columns, carrying the split across
/// arbitrarily sized input chunks.
struct WrappedWriter<W: Write> {
    inner: W,
    column: usize,
}

const FASTA_WIDTH: usize = 64;

impl<W: Write> WrappedWriter<W> {
    fn new(inner: W) -> Self {
        WrappedWriter { inner, column: 0 }
    }

    fn write_bases(&mut self, mut bases: &[u8]) -> io::Result<()> {
        while !bases.is_empty() {
            let room = FASTA_WIDTH - self.column;
            let n = room.min(bases.len());
            self.inner.write_all(&bases[..n])?;
            self.column += n;
            bases = &bases[n..];
            if self.column == FASTA_WIDTH {
                self.inner.write_all(b"\n")?;
                self.column = 0;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.column > 0 {
            self.inner.write_all(b"\n")?;
            self.column = 0;
        }
        Ok(())
    }
}

fn write_fasta<W: Write>(out: &mut W, id: &str, sequence: &[u8]) -> io::Result<()> {
    writeln!(out, ">{id}")?;
    let mut writer = WrappedWriter::new(out);
    writer.write_bases(sequence)?;
    writer.finish()
}

/// Convert an attribute value to its JSON rendering: taxa become tax ids
/// and accessions become accession ids unless a format template is given.
fn render_json(value: &AttrValue, format: Option<&str>) -> anyhow::Result<Value> {
    Ok(match value {
        AttrValue::Int(i) => json!(i),
        AttrValue::Str(s) => json!(s),
        AttrValue::StrList(items) => json!(items),
        AttrValue::Taxon(taxon) => render_taxon(taxon, format)?,
        AttrValue::Taxa(taxa) => Value::Array(
            taxa.iter()
                .map(|t| render_taxon(t, format))
                .collect::<anyhow::Result<_>>()?,
        ),
        AttrValue::Accessions(accessions) => Value::Array(
            accessions
                .iter()
                .map(|a| render_accession(a, format))
                .collect::<anyhow::Result<_>>()?,
        ),
        AttrValue::None => Value::Null,
    })
}

fn render_taxon(taxon: &Taxon, format: Option<&str>) -> anyhow::Result<Value> {
    Ok(match format {
        Some(template) => json!(render_template(template, |name| {
            Ok(display_string(&taxon.get_attr(name)?))
        })?),
        None => json!(taxon.tax_id()),
    })
}

fn render_accession(accession: &Accession, format: Option<&str>) -> anyhow::Result<Value> {
    Ok(match format {
        Some(template) => json!(render_template(template, |name| match name {
            "accession_id" => Ok(accession.id().to_string()),
            "tax_id" => Ok(accession.tax_id()?.to_string()),
            "length" => Ok(accession.length()?.to_string()),
            other => bail!("no such accession attribute: {other}"),
        })?),
        None => json!(accession.id()),
    })
}

/// Substitute `{name}` placeholders using the given attribute resolver.
fn render_template(
    template: &str,
    mut resolve: impl FnMut(&str) -> anyhow::Result<String>,
) -> anyhow::Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .with_context(|| format!("unclosed placeholder in format string {template:?}"))?;
        out.push_str(&resolve(&after[..close])?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Flatten an attribute value for format-string substitution.
fn display_string(value: &AttrValue) -> String {
    match value {
        AttrValue::Int(i) => i.to_string(),
        AttrValue::Str(s) => s.clone(),
        AttrValue::StrList(items) => items.join(","),
        AttrValue::Taxon(taxon) => taxon.tax_id().to_string(),
        AttrValue::Taxa(taxa) => taxa
            .iter()
            .map(|t| t.tax_id().to_string())
            .collect::<Vec<_>>()
            .join(","),
        AttrValue::Accessions(accessions) => accessions
            .iter()
            .map(|a| a.id().to_string())
            .collect::<Vec<_>>()
            .join(","),
        AttrValue::None => String::new(),
    }
}
