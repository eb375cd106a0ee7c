//! Malformed index data must surface as `CorruptIndex`, never hang or
//! panic.

use std::fs;
use tempfile::TempDir;

use taxoniq::index::TrieBuilder;
use taxoniq::schema::{Field, Schema};
use taxoniq::{Database, TaxoniqError};

const TAXA_SCHEMA: Schema = Schema::new(&[Field::U32, Field::U8, Field::U8, Field::U8]);

#[test]
fn parent_cycle_fails_the_lineage_walk() {
    let tmp = TempDir::new().unwrap();
    let mut taxa = TrieBuilder::new(TAXA_SCHEMA);
    // 2 and 3 point at each other; neither reaches the root.
    taxa.insert("1", &[1, 45, 0, 0]);
    taxa.insert("2", &[3, 45, 0, 0]);
    taxa.insert("3", &[2, 45, 0, 0]);
    taxa.write(&tmp.path().join("taxa.marisa")).unwrap();

    let db = Database::open(tmp.path());
    let taxon = db.taxon(2).unwrap();
    assert!(matches!(
        taxon.lineage(),
        Err(TaxoniqError::CorruptIndex(_))
    ));
}

#[test]
fn dangling_parent_is_not_silently_ignored() {
    let tmp = TempDir::new().unwrap();
    let mut taxa = TrieBuilder::new(TAXA_SCHEMA);
    taxa.insert("1", &[1, 45, 0, 0]);
    taxa.insert("7", &[99, 45, 0, 0]); // parent 99 does not exist
    taxa.write(&tmp.path().join("taxa.marisa")).unwrap();

    let db = Database::open(tmp.path());
    let taxon = db.taxon(7).unwrap();
    assert!(matches!(taxon.lineage(), Err(TaxoniqError::NotFound(_))));
}

#[test]
fn unknown_rank_id_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let mut taxa = TrieBuilder::new(TAXA_SCHEMA);
    taxa.insert("5", &[1, 200, 0, 0]); // no rank has id 200
    taxa.write(&tmp.path().join("taxa.marisa")).unwrap();

    let db = Database::open(tmp.path());
    assert!(matches!(db.taxon(5), Err(TaxoniqError::CorruptIndex(_))));
}

#[test]
fn garbage_index_file_is_rejected_on_open() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("taxa.marisa"), b"not an index at all").unwrap();
    let db = Database::open(tmp.path());
    assert!(matches!(db.taxon(1), Err(TaxoniqError::CorruptIndex(_))));
}
