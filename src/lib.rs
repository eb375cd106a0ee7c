// Taxoniq - fast, offline querying of NCBI Taxonomy and related data

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod accession;
pub mod blastdb;
pub mod build;
pub mod cli;
pub mod db;
pub mod fetch;
pub mod index;
pub mod rank;
pub mod schema;
pub mod taxon;
pub mod twobit;

pub use crate::accession::Accession;
pub use crate::db::Database;
pub use crate::rank::{BlastDatabase, Rank};
pub use crate::taxon::{AttrValue, Taxon};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxoniqError {
    /// The requested tax id, accession, or scientific name is absent from
    /// its primary index.
    #[error("not found: {0}")]
    NotFound(String),

    /// The taxon exists but has no value recorded for this attribute.
    #[error("no {0} recorded for this taxon")]
    NoValue(&'static str),

    #[error("expected exactly one of tax_id, accession_id, or scientific_name")]
    AmbiguousInput,

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("HTTP {status} for {url}")]
    NetworkStatus { status: u16, url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("build error: {0}")]
    Build(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaxoniqError>;
