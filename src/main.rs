use clap::Parser;
use colored::*;
use std::process;
use taxoniq::cli::Cli;
use taxoniq::TaxoniqError;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging with TAXONIQ_LOG environment variable support
    let log_level = std::env::var("TAXONIQ_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = taxoniq::cli::run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);

        // Unknown taxa and accessions get their own exit code so scripted
        // callers can tell them from real failures.
        let exit_code = match e.downcast_ref::<TaxoniqError>() {
            Some(TaxoniqError::NotFound(_)) => 4,
            _ => 1,
        };
        process::exit(exit_code);
    }
}
