//! Harvest of taxon descriptions from Wikidata and English Wikipedia.
//!
//! Walks the Wikidata items linking to Q16521 ("taxon"), keeps those whose
//! first P31 (instance of) value is Q16521 and which carry a P685 (NCBI
//! taxid) value, then pulls the English Wikipedia intro extract for each.
//! Output is newline-delimited JSON consumed by the index build.

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::fetch;
use crate::{Result, TaxoniqError};

const WIKIDATA_API: &str = "https://www.wikidata.org/w/api.php";
const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

/// Wikidata item for "taxon"; the link walk starts here.
const TAXON_ITEM: &str = "Q16521";

const PAGE_BATCH: usize = 50;
const EXTRACT_BATCH: usize = 20;
const EXTRACT_CHARS: &str = "9000";

/// One harvested taxon page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRecord {
    pub taxid: String,
    pub wikidata_id: String,
    pub en_wiki_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
}

fn get_json(url: &str, params: &[(&str, &str)]) -> Result<Value> {
    let response = fetch::client().get(url).query(params).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(TaxoniqError::NetworkStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.json()?)
}

/// Page ids of Wikidata items linking to [`TAXON_ITEM`], in batches of at
/// most [`PAGE_BATCH`], following API continuation.
fn linked_page_id_batches(max_batches: usize) -> Result<Vec<Vec<String>>> {
    let mut batches = Vec::new();
    let mut continue_params: BTreeMap<String, String> = BTreeMap::new();
    loop {
        let mut params = vec![
            ("action", "query"),
            ("prop", "linkshere"),
            ("lhnamespace", "0"),
            ("lhprop", "pageid|title"),
            ("lhlimit", "500"),
            ("format", "json"),
            ("titles", TAXON_ITEM),
        ];
        for (key, value) in &continue_params {
            params.push((key.as_str(), value.as_str()));
        }
        let doc = get_json(WIKIDATA_API, &params)?;

        let pages = doc["query"]["pages"]
            .as_object()
            .ok_or_else(|| TaxoniqError::Build("linkshere response without pages".into()))?;
        for page in pages.values() {
            let Some(links) = page["linkshere"].as_array() else {
                continue;
            };
            for chunk in links.chunks(PAGE_BATCH) {
                batches.push(
                    chunk
                        .iter()
                        .filter_map(|link| link["pageid"].as_u64())
                        .map(|id| id.to_string())
                        .collect(),
                );
            }
        }
        if batches.len() >= max_batches {
            break;
        }
        match doc["continue"].as_object() {
            Some(cont) => {
                continue_params = cont
                    .iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                        (k.clone(), v)
                    })
                    .collect();
            }
            None => break,
        }
    }
    Ok(batches)
}

/// Parse one batch of Wikidata entity pages into candidate records.
fn entities_for_batch(pageids: &[String]) -> Result<Vec<ExtractRecord>> {
    let ids = pageids.join("|");
    let doc = get_json(
        WIKIDATA_API,
        &[
            ("action", "query"),
            ("prop", "revisions"),
            ("rvprop", "content"),
            ("rvslots", "main"),
            ("format", "json"),
            ("pageids", &ids),
        ],
    )?;
    let pages = doc["query"]["pages"]
        .as_object()
        .ok_or_else(|| TaxoniqError::Build("revisions response without pages".into()))?;

    let mut records = Vec::new();
    for page in pages.values() {
        let title = page["title"].as_str().unwrap_or_default();
        let Some(content) = revision_content(page) else {
            continue;
        };
        let Ok(entity) = serde_json::from_str::<Value>(content) else {
            warn!(title, "unparseable entity revision");
            continue;
        };
        if entity.get("redirect").is_some() {
            continue;
        }
        let Some(en_wiki_title) = entity["sitelinks"]["enwiki"]["title"].as_str() else {
            continue;
        };
        let claims = &entity["claims"];
        // First P31 (instance of) value must be the taxon item itself.
        if claims["P31"][0]["mainsnak"]["datavalue"]["value"]["id"].as_str() != Some(TAXON_ITEM) {
            continue;
        }
        let p685 = &claims["P685"][0]["mainsnak"];
        if p685["snaktype"].as_str() == Some("novalue") {
            continue;
        }
        let Some(taxid) = p685["datavalue"]["value"].as_str() else {
            continue;
        };
        records.push(ExtractRecord {
            taxid: taxid.to_string(),
            wikidata_id: title.to_string(),
            en_wiki_title: en_wiki_title.to_string(),
            extract: None,
        });
    }
    Ok(records)
}

fn revision_content(page: &Value) -> Option<&str> {
    let revision = &page["revisions"][0];
    revision["slots"]["main"]["*"]
        .as_str()
        .or_else(|| revision["*"].as_str())
}

/// Fill in English Wikipedia intro extracts for a set of records.
fn fill_extracts(records: &mut [ExtractRecord]) -> Result<()> {
    let mut by_title: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        by_title.insert(&record.en_wiki_title, i);
    }
    let titles: Vec<&str> = by_title.keys().copied().collect();

    let mut extracts: Vec<(usize, String)> = Vec::new();
    for chunk in titles.chunks(EXTRACT_BATCH) {
        let joined = chunk.join("|");
        let doc = get_json(
            WIKIPEDIA_API,
            &[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("exchars", EXTRACT_CHARS),
                ("format", "json"),
                ("titles", &joined),
            ],
        )?;
        let Some(pages) = doc["query"]["pages"].as_object() else {
            continue;
        };
        for page in pages.values() {
            let (Some(title), Some(extract)) =
                (page["title"].as_str(), page["extract"].as_str())
            else {
                debug!(page = %page, "no extract for page");
                continue;
            };
            if page["ns"].as_i64() != Some(0) {
                continue;
            }
            if let Some(&index) = by_title.get(title) {
                extracts.push((index, clean_extract(extract)));
            }
        }
    }
    for (index, extract) in extracts {
        records[index].extract = Some(extract);
    }
    Ok(())
}

/// Strip placeholder paragraphs and trailing comment debris from an
/// extract as served by the API.
pub fn clean_extract(extract: &str) -> String {
    static EMPTY_ELT: OnceLock<Regex> = OnceLock::new();
    static TRAILING_COMMENT: OnceLock<Regex> = OnceLock::new();
    let empty_elt = EMPTY_ELT
        .get_or_init(|| Regex::new(r#"(?s)<p class="mw-empty-elt">.*?</p>"#).expect("regex"));
    let trailing_comment =
        TRAILING_COMMENT.get_or_init(|| Regex::new(r"(?s)<!--.*$").expect("regex"));
    let cleaned = empty_elt.replace_all(extract, "");
    trailing_comment.replace_all(&cleaned, "").trim().to_string()
}

fn process_batch(pageids: &[String]) -> Result<Vec<ExtractRecord>> {
    let mut records = entities_for_batch(pageids)?;
    if !records.is_empty() {
        fill_extracts(&mut records)?;
    }
    Ok(records)
}

/// Harvest up to `max_records` taxon pages into `out_path` (JSON lines).
/// Batches are fetched under API continuation and processed on the rayon
/// pool, [`PAGE_BATCH`] page ids per entity query and [`EXTRACT_BATCH`]
/// titles per extract query.
pub fn build_extract_index(out_path: &Path, max_records: Option<usize>) -> Result<()> {
    let limit = max_records.unwrap_or(usize::MAX);
    let batches = linked_page_id_batches(limit.div_ceil(PAGE_BATCH))?;
    info!(batches = batches.len(), "fetched candidate page id batches");

    let mut out = BufWriter::new(File::create(out_path)?);
    let mut written = 0usize;
    for window in batches.chunks(num_cpus::get().max(1)) {
        let results: Vec<Result<Vec<ExtractRecord>>> =
            window.par_iter().map(|batch| process_batch(batch)).collect();
        for result in results {
            for record in result? {
                serde_json::to_writer(&mut out, &record)
                    .map_err(|e| TaxoniqError::Build(format!("extract write: {e}")))?;
                out.write_all(b"\n")?;
                written += 1;
            }
        }
        info!(records = written, "wrote extract records");
        if written >= limit {
            break;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_extract_strips_empty_paragraphs() {
        let raw = "<p class=\"mw-empty-elt\">\n</p><p><b>Escherichia coli</b> is a bacterium.</p>";
        assert_eq!(
            clean_extract(raw),
            "<p><b>Escherichia coli</b> is a bacterium.</p>"
        );
    }

    #[test]
    fn clean_extract_strips_trailing_comment() {
        let raw = "<p>A taxon.</p><!-- \nNewPP limit report";
        assert_eq!(clean_extract(raw), "<p>A taxon.</p>");
    }
}
