//! Taxonomy node queries: records, names, lineages, and linked resources.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::accession::Accession;
use crate::db::{Attr, Database};
use crate::rank::Rank;
use crate::{Result, TaxoniqError};

/// Upper bound on parent-chain walks. The NCBI tree is well under 50 levels
/// deep; a walk that runs past this is cyclic and the index is bad.
const MAX_LINEAGE_DEPTH: usize = 128;

/// One node of the taxonomy, loaded from the taxa index.
#[derive(Clone)]
pub struct Taxon {
    db: Database,
    tax_id: u32,
    parent: u32,
    rank: Rank,
    division_id: u8,
    specified_species: bool,
}

impl Taxon {
    pub(crate) fn new(db: Database, tax_id: u32) -> Result<Taxon> {
        let record = db
            .taxa()?
            .first(&tax_id.to_string())?
            .ok_or_else(|| TaxoniqError::NotFound(tax_id.to_string()))?;
        let rank_id = record.get(1) as u8;
        let rank = Rank::from_id(rank_id).ok_or_else(|| {
            TaxoniqError::CorruptIndex(format!("taxon {tax_id} has unknown rank id {rank_id}"))
        })?;
        Ok(Taxon {
            db,
            tax_id,
            parent: record.get(0) as u32,
            rank,
            division_id: record.get(2) as u8,
            specified_species: record.get(3) != 0,
        })
    }

    /// Look up a taxon by numeric NCBI taxon id in the shared database.
    pub fn by_id(tax_id: u32) -> Result<Taxon> {
        Database::shared().taxon(tax_id)
    }

    /// Look up the taxon a sequence accession is assigned to.
    pub fn by_accession(accession_id: &str) -> Result<Taxon> {
        Database::shared().taxon_by_accession(accession_id)
    }

    /// Look up a taxon by its unique scientific name.
    pub fn by_scientific_name(name: &str) -> Result<Taxon> {
        Database::shared().taxon_by_scientific_name(name)
    }

    /// Resolve from exactly one of the three identifier forms; anything
    /// else is an [`TaxoniqError::AmbiguousInput`].
    pub fn from_query(
        tax_id: Option<u32>,
        accession_id: Option<&str>,
        scientific_name: Option<&str>,
    ) -> Result<Taxon> {
        let supplied =
            usize::from(tax_id.is_some()) + usize::from(accession_id.is_some())
                + usize::from(scientific_name.is_some());
        if supplied != 1 {
            return Err(TaxoniqError::AmbiguousInput);
        }
        if let Some(tax_id) = tax_id {
            Taxon::by_id(tax_id)
        } else if let Some(accession_id) = accession_id {
            Taxon::by_accession(accession_id)
        } else {
            Taxon::by_scientific_name(scientific_name.unwrap_or_default())
        }
    }

    pub fn tax_id(&self) -> u32 {
        self.tax_id
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn division_id(&self) -> u8 {
        self.division_id
    }

    /// Whether a species in this node's lineage has a formal name.
    pub fn specified_species(&self) -> bool {
        self.specified_species
    }

    /// The parent node, or `None` for the root (tax id 1, its own parent).
    pub fn parent(&self) -> Result<Option<Taxon>> {
        if self.tax_id == 1 {
            return Ok(None);
        }
        self.db.taxon(self.parent).map(Some)
    }

    pub fn scientific_name(&self) -> Result<String> {
        self.required_attr(Attr::ScientificName, "scientific name")
    }

    /// The NCBI BLAST name if recorded, else the GenBank common name, else
    /// the first listed common name. Fails with `NoValue` when the taxon
    /// has none of the three.
    pub fn common_name(&self) -> Result<String> {
        self.required_attr(Attr::CommonName, "common name")
    }

    /// Introductory paragraph from English Wikipedia, or `""` if absent.
    pub fn description(&self) -> Result<String> {
        Ok(self
            .db
            .attr(Attr::Description, self.tax_id)?
            .unwrap_or_default()
            .to_string())
    }

    /// The first non-empty description walking up the lineage, or `""`.
    pub fn best_available_description(&self) -> Result<String> {
        for taxon in self.lineage()? {
            let description = taxon.description()?;
            if !description.is_empty() {
                return Ok(description);
            }
        }
        Ok(String::new())
    }

    pub fn en_wiki_title(&self) -> Result<Option<String>> {
        Ok(self
            .db
            .attr(Attr::EnWikiTitle, self.tax_id)?
            .map(str::to_string))
    }

    /// This node and every ancestor, self first, root (tax id 1) last.
    pub fn lineage(&self) -> Result<Vec<Taxon>> {
        let mut lineage = vec![self.clone()];
        while lineage[lineage.len() - 1].tax_id != 1 {
            if lineage.len() > MAX_LINEAGE_DEPTH {
                return Err(TaxoniqError::CorruptIndex(format!(
                    "lineage of taxon {} did not reach the root within {MAX_LINEAGE_DEPTH} steps",
                    self.tax_id
                )));
            }
            let parent = lineage[lineage.len() - 1].parent;
            lineage.push(self.db.taxon(parent)?);
        }
        Ok(lineage)
    }

    /// Lineage filtered to the main ranks (species, genus, family, order,
    /// class, phylum, kingdom, superkingdom).
    pub fn ranked_lineage(&self) -> Result<Vec<Taxon>> {
        Ok(self
            .lineage()?
            .into_iter()
            .filter(|t| t.rank.is_common())
            .collect())
    }

    /// Direct child nodes, from the inverted parent index.
    pub fn child_nodes(&self) -> Result<Vec<Taxon>> {
        let Some(joined) = self.db.attr(Attr::ChildNodes, self.tax_id)? else {
            return Ok(Vec::new());
        };
        joined
            .split(',')
            .map(|id| {
                let tax_id = id.parse::<u32>().map_err(|_| {
                    TaxoniqError::CorruptIndex(format!(
                        "bad child id {id:?} recorded for taxon {}",
                        self.tax_id
                    ))
                })?;
                self.db.taxon(tax_id)
            })
            .collect()
    }

    pub fn ranked_child_nodes(&self) -> Result<Vec<Taxon>> {
        Ok(self
            .child_nodes()?
            .into_iter()
            .filter(|t| t.rank.is_common())
            .collect())
    }

    /// Potential hosts of this taxon, e.g. `["bacteria", "vertebrates"]`.
    pub fn host(&self) -> Result<Vec<String>> {
        Ok(match self.db.attr(Attr::Host, self.tax_id)? {
            Some(joined) => joined.split(',').map(str::to_string).collect(),
            None => Vec::new(),
        })
    }

    /// Accessions of the RefSeq representative genome for this taxon.
    pub fn refseq_representative_genome_accessions(&self) -> Result<Vec<Accession>> {
        self.accession_list(Attr::RefseqRepresentative)
    }

    /// Accessions of RefSeq genome assembled molecules for this taxon.
    pub fn refseq_genome_accessions(&self) -> Result<Vec<Accession>> {
        self.accession_list(Attr::Refseq)
    }

    /// The Wikidata item id, formatted `Q<digits>`, if one is recorded.
    pub fn wikidata_id(&self) -> Result<Option<String>> {
        Ok(self.db.wikidata_id(self.tax_id)?.map(|id| format!("Q{id}")))
    }

    /// URL of the NCBI Taxonomy browser page for this taxon.
    pub fn url(&self) -> String {
        format!(
            "https://www.ncbi.nlm.nih.gov/Taxonomy/Browser/wwwtax.cgi?mode=Info&id={}",
            self.tax_id
        )
    }

    pub fn wikidata_url(&self) -> Result<Option<String>> {
        Ok(self
            .wikidata_id()?
            .map(|id| format!("https://www.wikidata.org/wiki/{id}")))
    }

    /// Lowest common ancestor of the given taxa, or `None` for no input.
    pub fn lca(taxa: &[Taxon]) -> Result<Option<Taxon>> {
        let Some((first, rest)) = taxa.split_first() else {
            return Ok(None);
        };
        // Root-first lineages; the LCA is the last position where all agree.
        let mut common: Vec<Taxon> = first.lineage()?;
        common.reverse();
        for taxon in rest {
            let mut lineage = taxon.lineage()?;
            lineage.reverse();
            let shared = common
                .iter()
                .zip(&lineage)
                .take_while(|(a, b)| a.tax_id == b.tax_id)
                .count();
            common.truncate(shared);
            if common.is_empty() {
                return Ok(None);
            }
        }
        Ok(common.pop())
    }

    /// Attribute accessor used by output formatters; names are the
    /// snake_case method names.
    pub fn get_attr(&self, name: &str) -> Result<AttrValue> {
        Ok(match name {
            "tax_id" => AttrValue::Int(u64::from(self.tax_id)),
            "rank" => AttrValue::Str(self.rank.as_str().to_string()),
            "division_id" => AttrValue::Int(u64::from(self.division_id)),
            "specified_species" => AttrValue::Int(u64::from(self.specified_species)),
            "scientific_name" => AttrValue::Str(self.scientific_name()?),
            "common_name" => AttrValue::Str(self.common_name()?),
            "description" => AttrValue::Str(self.description()?),
            "best_available_description" => AttrValue::Str(self.best_available_description()?),
            "en_wiki_title" => AttrValue::from_opt(self.en_wiki_title()?),
            "parent" => match self.parent()? {
                Some(parent) => AttrValue::Taxon(parent),
                None => AttrValue::None,
            },
            "lineage" => AttrValue::Taxa(self.lineage()?),
            "ranked_lineage" => AttrValue::Taxa(self.ranked_lineage()?),
            "child_nodes" => AttrValue::Taxa(self.child_nodes()?),
            "ranked_child_nodes" => AttrValue::Taxa(self.ranked_child_nodes()?),
            "host" => AttrValue::StrList(self.host()?),
            "refseq_representative_genome_accessions" => {
                AttrValue::Accessions(self.refseq_representative_genome_accessions()?)
            }
            "refseq_genome_accessions" => {
                AttrValue::Accessions(self.refseq_genome_accessions()?)
            }
            "wikidata_id" => AttrValue::from_opt(self.wikidata_id()?),
            "url" => AttrValue::Str(self.url()),
            "wikidata_url" => AttrValue::from_opt(self.wikidata_url()?),
            _ => return Err(TaxoniqError::NotFound(format!("no such attribute: {name}"))),
        })
    }

    fn required_attr(&self, attr: Attr, label: &'static str) -> Result<String> {
        self.db
            .attr(attr, self.tax_id)?
            .map(str::to_string)
            .ok_or(TaxoniqError::NoValue(label))
    }

    fn accession_list(&self, attr: Attr) -> Result<Vec<Accession>> {
        Ok(match self.db.attr(attr, self.tax_id)? {
            Some(joined) => joined
                .split(',')
                .map(|id| Accession::with_db(self.db.clone(), id))
                .collect(),
            None => Vec::new(),
        })
    }
}

impl PartialEq for Taxon {
    fn eq(&self, other: &Self) -> bool {
        self.tax_id == other.tax_id
    }
}

impl Eq for Taxon {}

impl Hash for Taxon {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tax_id.hash(state);
    }
}

impl fmt::Debug for Taxon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Taxon")
            .field("tax_id", &self.tax_id)
            .field("rank", &self.rank)
            .finish()
    }
}

/// A dynamically typed attribute value, as consumed by output formatters.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(u64),
    Str(String),
    StrList(Vec<String>),
    Taxon(Taxon),
    Taxa(Vec<Taxon>),
    Accessions(Vec<Accession>),
    None,
}

impl AttrValue {
    fn from_opt(value: Option<String>) -> AttrValue {
        match value {
            Some(s) => AttrValue::Str(s),
            None => AttrValue::None,
        }
    }
}
