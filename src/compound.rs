use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MimiError, Result};
use crate::formula::ParsedFormula;
use crate::isotopologue::Isotopologue;

#[derive(Debug, Clone, Serialize, Deserialize)]
/** A compound with its precomputed mass data, as stored in a cache.

`mass` holds the ion-adjusted monoisotopic *exact* mass; the first entry
of `isotopologues` is the monoisotopic variant and carries the same mass.
*/
pub struct Compound {
    pub id: String,
    pub formula: String,
    pub name: String,
    pub parsed: ParsedFormula,
    pub mass: f64,
    pub isotopologues: Vec<Isotopologue>,
}

/// One row of a compound database TSV: formula, external id, name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundRow {
    pub formula: String,
    pub id: String,
    pub name: String,
}

/// Load compound rows from a TSV file.
///
/// Lines starting with `#` are comments. The first non-comment line is the
/// header; the positions of the `CF`, `ID` and `Name` columns are
/// discovered from it (falling back to columns 0, 1, 2). Any other column
/// is ignored, and a row missing a discovered column yields an empty
/// string for it.
pub fn load_compound_rows(path: &Path) -> Result<Vec<CompoundRow>> {
    let file = File::open(path).map_err(|e| MimiError::io(path.display().to_string(), e))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    let mut header_seen = false;
    let (mut cf_idx, mut id_idx, mut name_idx) = (0usize, 1usize, 2usize);
    for line in reader.lines() {
        let line = line.map_err(|e| MimiError::io(path.display().to_string(), e))?;
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if !header_seen {
            for (i, field) in fields.iter().enumerate() {
                match *field {
                    "CF" => cf_idx = i,
                    "ID" => id_idx = i,
                    "Name" => name_idx = i,
                    _ => {}
                }
            }
            header_seen = true;
            continue;
        }
        let get = |i: usize| fields.get(i).copied().unwrap_or("").to_string();
        rows.push(CompoundRow {
            formula: get(cf_idx),
            id: get(id_idx),
            name: get(name_idx),
        });
    }
    Ok(rows)
}
