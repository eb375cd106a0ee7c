mod common;

use pretty_assertions::assert_eq;
use taxoniq::{Rank, TaxoniqError};

#[test]
fn lineage_runs_from_self_to_root() {
    let (_tmp, db) = common::fixture_db();
    let taxon = db.taxon(511145).unwrap();
    let lineage = taxon.lineage().unwrap();
    let tax_ids: Vec<u32> = lineage.iter().map(|t| t.tax_id()).collect();
    assert_eq!(
        tax_ids,
        vec![511145, 83333, 562, 561, 543, 91347, 1236, 1224, 2, 131567, 1]
    );
    // Every consecutive pair is a parent edge.
    for pair in lineage.windows(2) {
        assert_eq!(pair[0].parent().unwrap().unwrap(), pair[1]);
    }
    assert!(lineage.last().unwrap().parent().unwrap().is_none());
}

#[test]
fn ranked_lineage_keeps_the_main_ranks() {
    let (_tmp, db) = common::fixture_db();
    let taxon = db.taxon(511145).unwrap();
    let tax_ids: Vec<u32> = taxon
        .ranked_lineage()
        .unwrap()
        .iter()
        .map(|t| t.tax_id())
        .collect();
    assert_eq!(tax_ids, vec![562, 561, 543, 91347, 1236, 1224, 2]);
}

#[test]
fn the_three_identifier_forms_agree() {
    let (_tmp, db) = common::fixture_db();
    let by_id = db.taxon(511145).unwrap();
    let by_accession = db.taxon_by_accession("NC_000913.3").unwrap();
    let by_name = db
        .taxon_by_scientific_name("Escherichia coli str. K-12 substr. MG1655")
        .unwrap();
    assert_eq!(by_id, by_accession);
    assert_eq!(by_id, by_name);
}

#[test]
fn scientific_name_round_trips_through_the_name_index() {
    let (_tmp, db) = common::fixture_db();
    for name in ["Escherichia coli", "Pirellula", "Mumps orthorubulavirus"] {
        let taxon = db.taxon_by_scientific_name(name).unwrap();
        assert_eq!(taxon.scientific_name().unwrap(), name);
    }
}

#[test]
fn common_name_prefers_the_blast_name() {
    let (_tmp, db) = common::fixture_db();
    // Both a "common name" and a "blast name" are recorded for Bacteria;
    // the blast name wins regardless of file order.
    assert_eq!(db.taxon(2).unwrap().common_name().unwrap(), "bacteria");
    // Only a genbank common name is recorded for E. coli.
    assert_eq!(db.taxon(562).unwrap().common_name().unwrap(), "E. coli");
}

#[test]
fn grandparent_of_the_strain_is_e_coli() {
    let (_tmp, db) = common::fixture_db();
    let taxon = db.taxon(511145).unwrap();
    let grandparent = taxon.parent().unwrap().unwrap().parent().unwrap().unwrap();
    assert_eq!(grandparent.tax_id(), 562);
    assert_eq!(grandparent.common_name().unwrap(), "E. coli");
}

#[test]
fn missing_common_name_is_no_value() {
    let (_tmp, db) = common::fixture_db();
    let taxon = db.taxon(123).unwrap();
    assert_eq!(taxon.scientific_name().unwrap(), "Pirellula");
    assert!(matches!(
        taxon.common_name(),
        Err(TaxoniqError::NoValue(_))
    ));
}

#[test]
fn root_children_are_the_four_top_level_nodes() {
    let (_tmp, db) = common::fixture_db();
    let names: Vec<String> = db
        .taxon(1)
        .unwrap()
        .child_nodes()
        .unwrap()
        .iter()
        .map(|t| t.scientific_name().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "Viruses",
            "cellular organisms",
            "unclassified entries",
            "other entries"
        ]
    );
}

#[test]
fn leaf_taxa_have_no_children() {
    let (_tmp, db) = common::fixture_db();
    assert!(db.taxon(511145).unwrap().child_nodes().unwrap().is_empty());
}

#[test]
fn host_list_is_comma_split() {
    let (_tmp, db) = common::fixture_db();
    assert_eq!(
        db.taxon(511145).unwrap().host().unwrap(),
        vec!["bacteria".to_string(), "vertebrates".to_string()]
    );
    assert!(db.taxon(562).unwrap().host().unwrap().is_empty());
}

#[test]
fn description_falls_back_to_empty_and_walks_parents() {
    let (_tmp, db) = common::fixture_db();
    let species = db.taxon(562).unwrap();
    assert!(species.description().unwrap().contains("Escherichia coli"));

    let strain = db.taxon(511145).unwrap();
    assert_eq!(strain.description().unwrap(), "");
    assert_eq!(
        strain.best_available_description().unwrap(),
        species.description().unwrap()
    );
    // Nothing in the Pirellula lineage has a description.
    assert_eq!(db.taxon(123).unwrap().best_available_description().unwrap(), "");
}

#[test]
fn wikidata_ids_format_with_q_prefix() {
    let (_tmp, db) = common::fixture_db();
    let taxon = db.taxon(562).unwrap();
    assert_eq!(taxon.wikidata_id().unwrap().as_deref(), Some("Q25419"));
    assert_eq!(
        taxon.wikidata_url().unwrap().as_deref(),
        Some("https://www.wikidata.org/wiki/Q25419")
    );
    assert_eq!(db.taxon(561).unwrap().wikidata_id().unwrap(), None);
    assert_eq!(
        taxon.en_wiki_title().unwrap().as_deref(),
        Some("Escherichia coli")
    );
}

#[test]
fn ncbi_browser_url() {
    let (_tmp, db) = common::fixture_db();
    assert_eq!(
        db.taxon(562).unwrap().url(),
        "https://www.ncbi.nlm.nih.gov/Taxonomy/Browser/wwwtax.cgi?mode=Info&id=562"
    );
}

#[test]
fn refseq_accession_lists() {
    let (_tmp, db) = common::fixture_db();
    let mumps = db.taxon_by_scientific_name("Mumps orthorubulavirus").unwrap();
    let accessions = mumps.refseq_genome_accessions().unwrap();
    assert_eq!(accessions.len(), 1);
    assert_eq!(accessions[0].id(), "AB040874.1");
    assert_eq!(accessions[0].tax_id().unwrap(), 2560602);

    let strain = db.taxon(511145).unwrap();
    let reps = strain.refseq_representative_genome_accessions().unwrap();
    assert_eq!(reps.len(), 1);
    assert_eq!(reps[0].id(), "NC_000913.3");
}

#[test]
fn rank_and_record_fields() {
    let (_tmp, db) = common::fixture_db();
    let species = db.taxon(562).unwrap();
    assert_eq!(species.rank(), Rank::Species);
    assert!(!species.specified_species());
    assert!(db.taxon(511145).unwrap().specified_species());
}

#[test]
fn unknown_ids_are_not_found() {
    let (_tmp, db) = common::fixture_db();
    assert!(matches!(
        db.taxon(999_999),
        Err(TaxoniqError::NotFound(_))
    ));
    assert!(matches!(
        db.taxon_by_scientific_name("No such organism"),
        Err(TaxoniqError::NotFound(_))
    ));
    assert!(matches!(
        db.taxon_by_accession("XX_999999.9"),
        Err(TaxoniqError::NotFound(_))
    ));
}

#[test]
fn lowest_common_ancestor() {
    let (_tmp, db) = common::fixture_db();
    let strain = db.taxon(511145).unwrap();
    let species = db.taxon(562).unwrap();
    let mumps = db.taxon(2560602).unwrap();

    let lca = taxoniq::Taxon::lca(&[strain.clone(), species.clone()]).unwrap();
    assert_eq!(lca.unwrap().tax_id(), 562);

    let lca = taxoniq::Taxon::lca(&[strain, mumps]).unwrap();
    assert_eq!(lca.unwrap().tax_id(), 1);

    assert!(taxoniq::Taxon::lca(&[]).unwrap().is_none());
}

#[test]
fn get_attr_exposes_the_formatter_surface() {
    let (_tmp, db) = common::fixture_db();
    let taxon = db.taxon(562).unwrap();
    match taxon.get_attr("rank").unwrap() {
        taxoniq::AttrValue::Str(s) => assert_eq!(s, "species"),
        other => panic!("unexpected value: {other:?}"),
    }
    match taxon.get_attr("ranked_lineage").unwrap() {
        taxoniq::AttrValue::Taxa(taxa) => assert_eq!(taxa[0].tax_id(), 562),
        other => panic!("unexpected value: {other:?}"),
    }
    assert!(taxon.get_attr("no_such_attr").is_err());
}
