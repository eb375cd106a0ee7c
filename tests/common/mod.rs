//! A small fixture database modeled on the E. coli corner of the NCBI
//! taxonomy, built through the real pipeline where possible.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use taxoniq::build::{build_index, IndexBuildConfig};
use taxoniq::index::{BlobBuilder, TrieBuilder};
use taxoniq::schema::{Field, Schema};
use taxoniq::Database;

pub const ID_SCHEMA: Schema = Schema::new(&[Field::U32]);
pub const ACCESSION_SCHEMA: Schema = Schema::new(&[Field::U32, Field::U16]);

/// (tax_id, parent, rank, scientific name)
const TAXA: &[(u32, u32, &str, &str)] = &[
    (1, 1, "no rank", "root"),
    (10239, 1, "superkingdom", "Viruses"),
    (131567, 1, "no rank", "cellular organisms"),
    (2787823, 1, "no rank", "unclassified entries"),
    (2787854, 1, "no rank", "other entries"),
    (2, 131567, "superkingdom", "Bacteria"),
    (1224, 2, "phylum", "Pseudomonadota"),
    (1236, 1224, "class", "Gammaproteobacteria"),
    (91347, 1236, "order", "Enterobacterales"),
    (543, 91347, "family", "Enterobacteriaceae"),
    (561, 543, "genus", "Escherichia"),
    (562, 561, "species", "Escherichia coli"),
    (83333, 562, "strain", "Escherichia coli K-12"),
    (
        511145,
        83333,
        "no rank",
        "Escherichia coli str. K-12 substr. MG1655",
    ),
    (123, 2, "genus", "Pirellula"),
    (2560602, 10239, "species", "Mumps orthorubulavirus"),
];

fn dmp_line(fields: &[&str]) -> String {
    format!("{}\t|\n", fields.join("\t|\t"))
}

fn node_line(tax_id: u32, parent: u32, rank: &str, specified_species: bool) -> String {
    let tax_id = tax_id.to_string();
    let parent = parent.to_string();
    let specified = if specified_species { "1" } else { "0" };
    dmp_line(&[
        &tax_id, &parent, rank, "XX", "0", "1", "11", "1", "0", "1", "1", "0", "", "11", "1",
        specified, "11", "1",
    ])
}

fn write_taxdump(dir: &Path) {
    let mut nodes = String::new();
    for &(tax_id, parent, rank, _) in TAXA {
        nodes.push_str(&node_line(tax_id, parent, rank, tax_id == 511145));
    }
    fs::write(dir.join("nodes.dmp"), nodes).unwrap();

    let mut names = String::new();
    for &(tax_id, _, _, scientific_name) in TAXA {
        names.push_str(&dmp_line(&[
            &tax_id.to_string(),
            scientific_name,
            "",
            "scientific name",
        ]));
    }
    // A lower-priority class listed first must not shadow the blast name.
    names.push_str(&dmp_line(&["2", "true bacteria", "", "common name"]));
    names.push_str(&dmp_line(&["2", "bacteria", "", "blast name"]));
    names.push_str(&dmp_line(&["562", "E. coli", "", "genbank common name"]));
    names.push_str(&dmp_line(&["10239", "viruses", "", "blast name"]));
    fs::write(dir.join("names.dmp"), names).unwrap();

    let mut hosts = String::new();
    hosts.push_str(&dmp_line(&["511145", "bacteria,vertebrates"]));
    fs::write(dir.join("host.dmp"), hosts).unwrap();
}

fn write_extracts(path: &Path) {
    let mut out = File::create(path).unwrap();
    writeln!(
        out,
        "{}",
        serde_json::json!({
            "taxid": "562",
            "wikidata_id": "Q25419",
            "en_wiki_title": "Escherichia coli",
            "extract": "<p><b>Escherichia coli</b> is a bacterium of the genus Escherichia.</p>"
        })
    )
    .unwrap();
    writeln!(
        out,
        "{}",
        serde_json::json!({
            "taxid": "10239",
            "wikidata_id": "Q808",
            "en_wiki_title": "Virus",
            "extract": "<p>A virus is a submicroscopic infectious agent.</p>"
        })
    )
    .unwrap();
}

/// (accession, packed key, tax_id, db id, volume, offset, length)
const ACCESSIONS: &[(&str, &str, u32, u8, u8, u32, u32)] = &[
    ("NC_000913.3", "NC000913.3", 511145, 2, 0, 96, 64),
    ("AB040874.1", "AB040874", 2560602, 1, 0, 0, 24),
];

fn write_accession_indexes(destdir: &Path) {
    let mut accessions = TrieBuilder::new(ACCESSION_SCHEMA);
    let mut offsets = TrieBuilder::new(ID_SCHEMA);
    let mut lengths = TrieBuilder::new(ID_SCHEMA);
    for &(_, packed, tax_id, db_id, volume, offset, length) in ACCESSIONS {
        let db_info = (u64::from(db_id) << 8) | u64::from(volume);
        accessions.insert(packed, &[u64::from(tax_id), db_info]);
        offsets.insert(packed, &[u64::from(offset)]);
        lengths.insert(packed, &[u64::from(length)]);
    }
    for (subdir, builder) in [
        ("accessions", &accessions),
        ("accession_offsets", &offsets),
        ("accession_lengths", &lengths),
    ] {
        let dir = destdir.join(subdir);
        fs::create_dir_all(&dir).unwrap();
        builder.write(&dir.join("db.marisa")).unwrap();
    }
}

fn write_string_index(destdir: &Path, name: &str, pairs: &[(&str, &str)]) {
    let mut blob = BlobBuilder::new();
    let mut positions = TrieBuilder::new(ID_SCHEMA);
    for (key, value) in pairs {
        let offset = blob.append(value).unwrap();
        positions.insert(key, &[u64::from(offset)]);
    }
    blob.write(&destdir.join(format!("{name}.zstd"))).unwrap();
    positions
        .write(&destdir.join(format!("{name}.marisa")))
        .unwrap();
}

/// Build the complete fixture database in a temp dir.
pub fn fixture_db() -> (TempDir, Database) {
    let tmp = TempDir::new().unwrap();
    let taxdump_dir = tmp.path().join("taxdump");
    let destdir = tmp.path().join("db");
    fs::create_dir_all(&taxdump_dir).unwrap();
    write_taxdump(&taxdump_dir);

    let extracts = tmp.path().join("wikipedia_extracts.json");
    write_extracts(&extracts);

    build_index(&IndexBuildConfig {
        taxdump_dir,
        blastdb_dir: None,
        databases: Vec::new(),
        wikipedia_extracts: Some(extracts),
        destdir: destdir.clone(),
    })
    .unwrap();

    // The accession side of the build needs blastdbcmd and local BLAST
    // volumes; the fixture writes those indexes directly instead.
    write_accession_indexes(&destdir);
    write_string_index(&destdir, "taxid2refrep", &[("511145", "NC_000913.3")]);
    write_string_index(&destdir, "taxid2refseq", &[("2560602", "AB040874.1")]);

    let db = Database::open(&destdir);
    (tmp, db)
}
