//! Offline builder for the taxoniq index artifacts.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;
use taxoniq::build::{self, refseq, wiki, IndexBuildConfig};
use taxoniq::rank::{BlastDatabase, ALL_BLAST_DATABASES};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "taxoniq_build",
    version,
    about = "Build the taxoniq index artifacts from NCBI taxdump, BLAST databases, RefSeq, and Wikipedia"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the taxonomy and accession indexes
    Index(IndexArgs),

    /// Harvest taxon intro extracts from Wikidata and English Wikipedia
    Wiki(WikiArgs),

    /// Build the per-taxon RefSeq genome accession index
    Refseq(RefseqArgs),
}

#[derive(clap::Args)]
struct IndexArgs {
    /// Directory holding (or receiving) the NCBI taxdump files
    #[arg(long, default_value = ".")]
    taxdump_dir: PathBuf,

    /// Directory holding BLAST database volumes and the accession cache
    #[arg(long, env = "BLASTDB")]
    blastdb_dir: Option<PathBuf>,

    /// Space-separated BLAST databases to ingest (defaults to all)
    #[arg(long, env = "BLAST_DATABASES")]
    blast_databases: Option<String>,

    /// Wikipedia extract file produced by the `wiki` subcommand
    #[arg(long)]
    wikipedia_extracts: Option<PathBuf>,

    /// Destination directory for the artifacts
    #[arg(long)]
    destdir: PathBuf,
}

#[derive(clap::Args)]
struct WikiArgs {
    /// Output file (newline-delimited JSON)
    #[arg(long)]
    output: PathBuf,

    /// Stop after this many records (for smoke runs)
    #[arg(long)]
    max_records: Option<usize>,
}

#[derive(clap::Args)]
struct RefseqArgs {
    /// Destination directory for the artifacts
    #[arg(long)]
    destdir: PathBuf,

    /// Download cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Accession index to filter against (accessions/db.marisa)
    #[arg(long)]
    accessions_index: Option<PathBuf>,

    /// Comma-separated organism whitelist
    #[arg(long, env = "FETCH_REFSEQ_ASSEMBLIES")]
    organisms: Option<String>,
}

fn main() {
    let log_level = std::env::var("TAXONIQ_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Index(args) => {
            let databases = match args.blast_databases.as_deref() {
                None => ALL_BLAST_DATABASES.to_vec(),
                Some(names) => names
                    .split_whitespace()
                    .map(|name| {
                        BlastDatabase::from_name(name)
                            .with_context(|| format!("unknown BLAST database {name:?}"))
                    })
                    .collect::<anyhow::Result<_>>()?,
            };
            let config = IndexBuildConfig {
                taxdump_dir: args.taxdump_dir,
                blastdb_dir: args.blastdb_dir,
                databases,
                wikipedia_extracts: args.wikipedia_extracts,
                destdir: args.destdir,
            };
            build::build_index(&config)?;
        }
        Commands::Wiki(args) => {
            wiki::build_extract_index(&args.output, args.max_records)?;
        }
        Commands::Refseq(args) => {
            let cache_dir = args
                .cache_dir
                .unwrap_or_else(|| std::env::temp_dir().join("taxoniq-build"));
            let whitelist = args
                .organisms
                .as_deref()
                .map(refseq::parse_whitelist)
                .unwrap_or_default();
            refseq::build_refseq_index(
                &args.destdir,
                &cache_dir,
                args.accessions_index.as_deref(),
                &whitelist,
            )?;
        }
    }
    Ok(())
}
