//! Ranged retrieval of packed sequences from the public BLAST database
//! mirrors, decoded on the fly.

use reqwest::blocking::{Client, Response};
use reqwest::header::RANGE;
use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use crate::db::BLAST_DB_TIMESTAMP;
use crate::rank::BlastDatabase;
use crate::twobit::SequenceReader;
use crate::{Result, TaxoniqError};

/// Public mirrors of the NCBI BLAST database snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    S3,
    Gcs,
}

impl Mirror {
    fn base(self) -> &'static str {
        match self {
            Mirror::S3 => "ncbi-blast-databases.s3.amazonaws.com",
            Mirror::Gcs => "storage.googleapis.com/blast-db",
        }
    }
}

/// Shared blocking client; connections are pooled across fetches.
pub(crate) fn client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .user_agent(concat!("taxoniq/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host((num_cpus::get() + 4).min(32))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to construct HTTP client")
    })
}

/// A streaming reader of ASCII bases for one accession.
pub struct SequenceStream {
    reader: SequenceReader<Response>,
    url: String,
}

impl SequenceStream {
    /// The mirror URL the bytes are being read from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Read for SequenceStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.reader.read(out)
    }
}

/// Issue a range GET for the packed sequence at `offset` in the given
/// database volume and pipe it through the 2-bit decoder. The end of the
/// range is `offset + ceil(length/4)`, covering the remainder byte; the
/// decoder's length bound drops the excess.
pub fn fetch_sequence(
    mirror: Mirror,
    db: BlastDatabase,
    volume: u8,
    offset: u32,
    length: u32,
) -> Result<SequenceStream> {
    let url = volume_url(mirror, db, volume);
    let end = u64::from(offset) + u64::from(length).div_ceil(4);
    let response = client()
        .get(&url)
        .header(RANGE, format!("bytes={offset}-{end}"))
        .send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(TaxoniqError::NetworkStatus {
            status: status.as_u16(),
            url,
        });
    }
    Ok(SequenceStream {
        reader: SequenceReader::new(response, u64::from(length)),
        url,
    })
}

/// URL of one volume's packed-sequence file on a mirror.
pub fn volume_url(mirror: Mirror, db: BlastDatabase, volume: u8) -> String {
    format!(
        "https://{}/{}/{}.nsq",
        mirror.base(),
        BLAST_DB_TIMESTAMP,
        db.volume_file_stem(volume)
    )
}
