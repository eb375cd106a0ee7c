//! Streaming decoder for NcbiNa2, the 2-bit nucleotide packing used by
//! BLAST database volumes: four bases per byte, most significant pair
//! first, 0=A 1=C 2=G 3=T.

use std::io::{self, Read};

use crate::{Result, TaxoniqError};

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Every possible input byte expanded to its four ASCII bases.
static BYTE_TO_BASES: [[u8; 4]; 256] = build_table();

const fn build_table() -> [[u8; 4]; 256] {
    let mut table = [[0u8; 4]; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut pair = 0;
        while pair < 4 {
            let shift = 6 - 2 * pair;
            table[byte][pair] = BASES[(byte >> shift) & 0b11];
            pair += 1;
        }
        byte += 1;
    }
    table
}

/// Incremental NcbiNa2 → ASCII decoder, bounded by the declared sequence
/// length. The terminator/remainder byte of the on-disk encoding falls
/// past the bound and is discarded by truncation.
pub struct TwoBitDecoder {
    length: u64,
    bases_seen: u64,
}

impl TwoBitDecoder {
    pub fn new(length: u64) -> Self {
        TwoBitDecoder {
            length,
            bases_seen: 0,
        }
    }

    /// Decode one chunk of packed bytes. The total output across all calls
    /// never exceeds the declared length.
    pub fn decompress(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() * 4);
        for &byte in data {
            out.extend_from_slice(&BYTE_TO_BASES[byte as usize]);
        }
        let remaining = self.length - self.bases_seen;
        if out.len() as u64 > remaining {
            out.truncate(remaining as usize);
        }
        self.bases_seen += out.len() as u64;
        out
    }

    pub fn flush(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Whether the declared number of bases has been produced.
    pub fn is_complete(&self) -> bool {
        self.bases_seen >= self.length
    }

    pub fn bases_seen(&self) -> u64 {
        self.bases_seen
    }
}

/// Pack ASCII bases into NcbiNa2 bytes, padding the final partial byte
/// with zero bits. Used to assemble fixture volumes.
pub fn encode(bases: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bases.len().div_ceil(4));
    for chunk in bases.chunks(4) {
        let mut byte = 0u8;
        for (i, &base) in chunk.iter().enumerate() {
            let code = match base {
                b'A' | b'a' => 0,
                b'C' | b'c' => 1,
                b'G' | b'g' => 2,
                b'T' | b't' => 3,
                other => {
                    return Err(TaxoniqError::Build(format!(
                        "cannot 2-bit encode byte {other:#04x}"
                    )))
                }
            };
            byte |= code << (6 - 2 * i);
        }
        out.push(byte);
    }
    Ok(out)
}

/// Adapts a packed byte stream into a reader of ASCII bases, decoding
/// incrementally; nothing buffers more than one input chunk.
pub struct SequenceReader<R: Read> {
    inner: R,
    decoder: TwoBitDecoder,
    decoded: Vec<u8>,
    pos: usize,
}

impl<R: Read> SequenceReader<R> {
    pub fn new(inner: R, length: u64) -> Self {
        SequenceReader {
            inner,
            decoder: TwoBitDecoder::new(length),
            decoded: Vec::new(),
            pos: 0,
        }
    }
}

impl<R: Read> Read for SequenceReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.decoded.len() {
                let n = out.len().min(self.decoded.len() - self.pos);
                out[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.decoder.is_complete() {
                return Ok(0);
            }
            let mut chunk = [0u8; 8192];
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                // Upstream ended before the declared length was reached.
                return Ok(0);
            }
            self.decoded = self.decoder.decompress(&chunk[..n]);
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_expands_to_four_bases() {
        // 0b00_01_10_11 = A C G T
        let mut decoder = TwoBitDecoder::new(4);
        assert_eq!(decoder.decompress(&[0b0001_1011]), b"ACGT");
        assert!(decoder.is_complete());
    }

    #[test]
    fn output_is_truncated_to_declared_length() {
        let mut decoder = TwoBitDecoder::new(6);
        assert_eq!(decoder.decompress(&[0b0001_1011, 0b1110_0100]), b"ACGTTG");
        assert_eq!(decoder.decompress(&[0xff]), b"");
        assert_eq!(decoder.flush(), b"");
    }

    #[test]
    fn truncation_spans_chunk_boundaries() {
        let mut decoder = TwoBitDecoder::new(5);
        assert_eq!(decoder.decompress(&[0b0001_1011]), b"ACGT");
        assert_eq!(decoder.decompress(&[0b1100_0000]), b"T");
        assert!(decoder.is_complete());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let bases = b"AGCTTTTCATTCTGACTG";
        let packed = encode(bases).unwrap();
        let mut decoder = TwoBitDecoder::new(bases.len() as u64);
        assert_eq!(decoder.decompress(&packed), bases);
    }

    #[test]
    fn sequence_reader_streams_exact_length() {
        let bases = b"ACGTACGTACGTA";
        let mut packed = encode(bases).unwrap();
        packed.push(0x00); // trailing terminator byte, discarded by the bound
        let mut reader = SequenceReader::new(&packed[..], bases.len() as u64);
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, bases);
    }
}
