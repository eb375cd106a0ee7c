//! Typed readers for the NCBI taxdump tables consumed by the build.
//!
//! Rows are `\t|\t`-separated with a trailing `\t|`; every reader streams
//! line by line and fails on rows it cannot type.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::rank::Rank;
use crate::{Result, TaxoniqError};

fn open_table(dir: &Path, table: &str) -> Result<Lines<BufReader<File>>> {
    let path = dir.join(format!("{table}.dmp"));
    let file = File::open(&path).map_err(|e| {
        TaxoniqError::Build(format!("cannot open {}: {e}", path.display()))
    })?;
    Ok(BufReader::new(file).lines())
}

fn split_row(line: &str) -> Vec<&str> {
    line.trim()
        .split("\t|\t")
        .map(|field| field.trim_end_matches("\t|"))
        .collect()
}

fn parse_u32(value: &str, what: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .map_err(|_| TaxoniqError::Build(format!("bad {what}: {value:?}")))
}

/// One row of `nodes.dmp`, reduced to the fields the index stores.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub tax_id: u32,
    pub parent: u32,
    pub rank: Rank,
    pub division_id: u8,
    pub specified_species: bool,
}

pub struct NodesReader {
    lines: Lines<BufReader<File>>,
}

impl NodesReader {
    pub fn open(dir: &Path) -> Result<NodesReader> {
        Ok(NodesReader {
            lines: open_table(dir, "nodes")?,
        })
    }
}

impl Iterator for NodesReader {
    type Item = Result<NodeRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        Some(parse_node_row(&line))
    }
}

fn parse_node_row(line: &str) -> Result<NodeRow> {
    let fields = split_row(line);
    if fields.len() < 16 {
        return Err(TaxoniqError::Build(format!(
            "nodes.dmp row has {} fields, expected at least 16",
            fields.len()
        )));
    }
    let rank = Rank::from_name(fields[2])
        .ok_or_else(|| TaxoniqError::Build(format!("unknown rank {:?}", fields[2])))?;
    Ok(NodeRow {
        tax_id: parse_u32(fields[0], "tax id")?,
        parent: parse_u32(fields[1], "parent tax id")?,
        rank,
        division_id: parse_u32(fields[4], "division id")? as u8,
        specified_species: fields[15] == "1",
    })
}

/// One row of `names.dmp`.
#[derive(Debug, Clone)]
pub struct NameRow {
    pub tax_id: u32,
    pub name: String,
    pub name_class: String,
}

pub struct NamesReader {
    lines: Lines<BufReader<File>>,
}

impl NamesReader {
    pub fn open(dir: &Path) -> Result<NamesReader> {
        Ok(NamesReader {
            lines: open_table(dir, "names")?,
        })
    }
}

impl Iterator for NamesReader {
    type Item = Result<NameRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        Some(parse_name_row(&line))
    }
}

fn parse_name_row(line: &str) -> Result<NameRow> {
    let fields = split_row(line);
    if fields.len() < 4 {
        return Err(TaxoniqError::Build(format!(
            "names.dmp row has {} fields, expected 4",
            fields.len()
        )));
    }
    Ok(NameRow {
        tax_id: parse_u32(fields[0], "tax id")?,
        name: fields[1].to_string(),
        name_class: fields[3].to_string(),
    })
}

/// One row of `host.dmp`: a taxon and its comma-joined potential hosts.
#[derive(Debug, Clone)]
pub struct HostRow {
    pub tax_id: u32,
    pub potential_hosts: String,
}

pub struct HostReader {
    lines: Lines<BufReader<File>>,
}

impl HostReader {
    pub fn open(dir: &Path) -> Result<HostReader> {
        Ok(HostReader {
            lines: open_table(dir, "host")?,
        })
    }
}

impl Iterator for HostReader {
    type Item = Result<HostRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        let fields = split_row(&line);
        if fields.len() < 2 {
            return Some(Err(TaxoniqError::Build(format!(
                "host.dmp row has {} fields, expected 2",
                fields.len()
            ))));
        }
        Some(parse_u32(fields[0], "tax id").map(|tax_id| HostRow {
            tax_id,
            potential_hosts: fields[1].to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_node_rows() {
        let line = "562\t|\t561\t|\tspecies\t|\tEC\t|\t0\t|\t1\t|\t11\t|\t1\t|\t0\t|\t1\t|\t1\t|\t0\t|\t\t|\t11\t|\t1\t|\t1\t|\t11\t|\t1\t|";
        let row = parse_node_row(line).unwrap();
        assert_eq!(row.tax_id, 562);
        assert_eq!(row.parent, 561);
        assert_eq!(row.rank, Rank::Species);
        assert_eq!(row.division_id, 0);
        assert!(row.specified_species);
    }

    #[test]
    fn parses_name_rows() {
        let line = "562\t|\tEscherichia coli\t|\t\t|\tscientific name\t|";
        let row = parse_name_row(line).unwrap();
        assert_eq!(row.tax_id, 562);
        assert_eq!(row.name, "Escherichia coli");
        assert_eq!(row.name_class, "scientific name");
    }

    #[test]
    fn unknown_rank_is_a_build_error() {
        let line = "1\t|\t1\t|\tmystery rank\t|\t\t|\t0\t|\t1\t|\t11\t|\t1\t|\t0\t|\t1\t|\t1\t|\t0\t|\t\t|\t11\t|\t1\t|\t0\t|\t11\t|\t1\t|";
        assert!(matches!(parse_node_row(line), Err(TaxoniqError::Build(_))));
    }

    #[test]
    fn host_reader_reads_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("host.dmp")).unwrap();
        writeln!(file, "511145\t|\tbacteria,vertebrates\t|").unwrap();
        drop(file);

        let rows: Vec<_> = HostReader::open(dir.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tax_id, 511145);
        assert_eq!(rows[0].potential_hosts, "bacteria,vertebrates");
    }
}
