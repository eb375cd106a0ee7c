//! Parser for BLAST database volume index headers (`.nin` files).
//!
//! Layout per NCBI's seqdbfile format, version 5. All multi-byte integers
//! are big-endian except `volume_length`, which is little-endian. The
//! sequence offset array converts an accession's ordinal id into the byte
//! offset of its packed sequence in the companion `.nsq` payload.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::{Result, TaxoniqError};

const FORMAT_VERSION: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceType {
    Nucleotide,
    Protein,
}

/// Parsed `.nin` header with the ordinal→offset array.
#[derive(Debug)]
pub struct VolumeHeader {
    pub sequence_type: SequenceType,
    pub volume: u32,
    pub title: String,
    pub create_date: String,
    pub num_oids: u32,
    pub volume_length: i64,
    pub max_seq_length: u32,
    sequence_offsets: Vec<u32>,
}

impl VolumeHeader {
    pub fn read(path: &Path) -> Result<VolumeHeader> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
            .map_err(|e| annotate(e, &path.display().to_string()))
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<VolumeHeader> {
        let format_version = read_u32(&mut reader)?;
        if format_version != FORMAT_VERSION {
            return Err(TaxoniqError::CorruptIndex(format!(
                "unsupported volume format version {format_version}, expected {FORMAT_VERSION}"
            )));
        }
        let sequence_type = match read_u32(&mut reader)? {
            0 => SequenceType::Nucleotide,
            1 => SequenceType::Protein,
            other => {
                return Err(TaxoniqError::CorruptIndex(format!(
                    "unknown sequence type {other}"
                )))
            }
        };
        let volume = read_u32(&mut reader)?;
        let title = read_string(&mut reader)?;
        let _lmdb_file = read_string(&mut reader)?;
        let create_date = read_string(&mut reader)?;
        let num_oids = read_u32(&mut reader)?;
        let volume_length = reader
            .read_i64::<LittleEndian>()
            .map_err(eof_is_corrupt)?;
        let max_seq_length = read_u32(&mut reader)?;

        // Skip the header offset array; only sequence offsets matter here.
        let array_bytes = (u64::from(num_oids) + 1) * 4;
        io::copy(&mut reader.by_ref().take(array_bytes), &mut io::sink())?;

        let mut sequence_offsets = Vec::with_capacity(num_oids as usize + 1);
        for _ in 0..=num_oids {
            sequence_offsets.push(read_u32(&mut reader)?);
        }

        Ok(VolumeHeader {
            sequence_type,
            volume,
            title,
            create_date,
            num_oids,
            volume_length,
            max_seq_length,
            sequence_offsets,
        })
    }

    /// Byte offset of the sequence with the given ordinal id in the
    /// volume's `.nsq` payload.
    pub fn sequence_offset(&self, ordinal_id: u32) -> Result<u32> {
        self.sequence_offsets
            .get(ordinal_id as usize)
            .copied()
            .ok_or_else(|| {
                TaxoniqError::CorruptIndex(format!(
                    "ordinal id {ordinal_id} out of range for volume of {} sequences",
                    self.num_oids
                ))
            })
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    reader.read_u32::<BigEndian>().map_err(eof_is_corrupt)
}

/// Length-prefixed string: u32 big-endian byte count, then the bytes.
fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u32(reader)?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).map_err(eof_is_corrupt)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// A short read means the file ends mid-structure, which is corruption,
/// not an I/O environment problem.
fn eof_is_corrupt(err: io::Error) -> TaxoniqError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TaxoniqError::CorruptIndex("truncated volume header".to_string())
    } else {
        TaxoniqError::Io(err)
    }
}

fn annotate(err: TaxoniqError, path: &str) -> TaxoniqError {
    match err {
        TaxoniqError::CorruptIndex(detail) => {
            TaxoniqError::CorruptIndex(format!("{path}: {detail}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod fixtures {
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use std::io::Write;

    /// Assemble a minimal valid `.nin` header for tests.
    pub fn volume_header(
        volume: u32,
        title: &str,
        sequence_offsets: &[u32],
    ) -> Vec<u8> {
        let num_oids = (sequence_offsets.len() - 1) as u32;
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(super::FORMAT_VERSION).unwrap();
        out.write_u32::<BigEndian>(0).unwrap(); // nucleotide
        out.write_u32::<BigEndian>(volume).unwrap();
        for s in [title, "", "2024-06-15"] {
            out.write_u32::<BigEndian>(s.len() as u32).unwrap();
            out.write_all(s.as_bytes()).unwrap();
        }
        out.write_u32::<BigEndian>(num_oids).unwrap();
        out.write_i64::<LittleEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        for _ in 0..=num_oids {
            out.write_u32::<BigEndian>(0).unwrap(); // header array, unused
        }
        for &offset in sequence_offsets {
            out.write_u32::<BigEndian>(offset).unwrap();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixture_header() {
        let bytes = fixtures::volume_header(3, "test volume", &[0, 100, 260]);
        let header = VolumeHeader::from_reader(&bytes[..]).unwrap();
        assert_eq!(header.sequence_type, SequenceType::Nucleotide);
        assert_eq!(header.volume, 3);
        assert_eq!(header.title, "test volume");
        assert_eq!(header.create_date, "2024-06-15");
        assert_eq!(header.num_oids, 2);
        assert_eq!(header.sequence_offset(0).unwrap(), 0);
        assert_eq!(header.sequence_offset(1).unwrap(), 100);
        assert_eq!(header.sequence_offset(2).unwrap(), 260);
    }

    #[test]
    fn rejects_wrong_format_version() {
        let mut bytes = fixtures::volume_header(0, "v", &[0, 4]);
        bytes[3] = 4; // format_version = 4
        assert!(matches!(
            VolumeHeader::from_reader(&bytes[..]),
            Err(TaxoniqError::CorruptIndex(_))
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = fixtures::volume_header(0, "v", &[0, 4]);
        assert!(matches!(
            VolumeHeader::from_reader(&bytes[..bytes.len() - 3]),
            Err(TaxoniqError::CorruptIndex(_))
        ));
    }

    #[test]
    fn ordinal_out_of_range_is_an_error() {
        let bytes = fixtures::volume_header(0, "v", &[0, 4]);
        let header = VolumeHeader::from_reader(&bytes[..]).unwrap();
        assert!(header.sequence_offset(5).is_err());
    }
}
