//! Fixed-size record tuples stored against each trie key.
//!
//! A schema is a property of the index opening a file, never of the file
//! itself: the on-disk payload is raw little-endian record bytes, and the
//! caller declares how to slice them.

use byteorder::{ByteOrder, LittleEndian};

/// One unsigned integer field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    U32,
    U16,
    U8,
}

impl Field {
    pub const fn width(self) -> usize {
        match self {
            Field::U32 => 4,
            Field::U16 => 2,
            Field::U8 => 1,
        }
    }
}

/// Widest record used by any taxoniq index (parent, rank, division, flag).
pub const MAX_FIELDS: usize = 4;

/// An ordered list of record fields, e.g. `(u32, u8, u8, u8)` for taxon
/// records or `(u32, u16)` for accession records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        assert!(fields.len() <= MAX_FIELDS);
        assert!(!fields.is_empty());
        Schema { fields }
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Encoded size of one record in bytes.
    pub fn record_size(&self) -> usize {
        self.fields.iter().map(|f| f.width()).sum()
    }

    /// Decode one record from exactly `record_size()` bytes.
    ///
    /// Callers are expected to have validated the slice length against the
    /// schema already; this is the hot path under a successful lookup.
    pub fn decode(&self, bytes: &[u8]) -> Record {
        debug_assert_eq!(bytes.len(), self.record_size());
        let mut values = [0u64; MAX_FIELDS];
        let mut pos = 0;
        for (i, field) in self.fields.iter().enumerate() {
            values[i] = match field {
                Field::U32 => u64::from(LittleEndian::read_u32(&bytes[pos..pos + 4])),
                Field::U16 => u64::from(LittleEndian::read_u16(&bytes[pos..pos + 2])),
                Field::U8 => u64::from(bytes[pos]),
            };
            pos += field.width();
        }
        Record {
            values,
            len: self.fields.len(),
        }
    }

    /// Append the encoding of `values` to `out`. Values wider than their
    /// field are truncated to the field width.
    pub fn encode_into(&self, values: &[u64], out: &mut Vec<u8>) {
        debug_assert_eq!(values.len(), self.fields.len());
        for (value, field) in values.iter().zip(self.fields) {
            match field {
                Field::U32 => {
                    let mut buf = [0u8; 4];
                    LittleEndian::write_u32(&mut buf, *value as u32);
                    out.extend_from_slice(&buf);
                }
                Field::U16 => {
                    let mut buf = [0u8; 2];
                    LittleEndian::write_u16(&mut buf, *value as u16);
                    out.extend_from_slice(&buf);
                }
                Field::U8 => out.push(*value as u8),
            }
        }
    }
}

/// A decoded record: up to [`MAX_FIELDS`] integer values widened to u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    values: [u64; MAX_FIELDS],
    len: usize,
}

impl Record {
    pub fn get(&self, index: usize) -> u64 {
        self.values()[index]
    }

    pub fn values(&self) -> &[u64] {
        &self.values[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAXON: Schema = Schema::new(&[Field::U32, Field::U8, Field::U8, Field::U8]);
    const PAIR: Schema = Schema::new(&[Field::U32, Field::U16]);

    #[test]
    fn record_size_sums_field_widths() {
        assert_eq!(TAXON.record_size(), 7);
        assert_eq!(PAIR.record_size(), 6);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = Vec::new();
        TAXON.encode_into(&[131567, 43, 0, 1], &mut buf);
        assert_eq!(buf.len(), 7);
        let record = TAXON.decode(&buf);
        assert_eq!(record.values(), &[131567, 43, 0, 1]);
    }

    #[test]
    fn u16_field_truncates_to_width() {
        let mut buf = Vec::new();
        PAIR.encode_into(&[1, 0x1_0203], &mut buf);
        let record = PAIR.decode(&buf);
        assert_eq!(record.get(1), 0x0203);
    }
}
