use std::collections::HashMap;
use std::fs;
use std::path::Path;

use fnv::FnvBuildHasher as RandomState;
use serde::Deserialize;

use crate::element::{Element, Isotope};
use crate::error::{MimiError, Result};

/// The reference natural-abundance isotope table, NIST-derived. Per-element
/// abundances fold bit-exactly to 1.0 in descending-abundance order.
static NATURAL_ISOTOPE_ABUNDANCE: &str = include_str!("../data/natural_isotope_abundance_nist.json");

/// Identifier recorded in cache metadata for the embedded table.
pub const NATURAL_TABLE_NAME: &str = "natural_isotope_abundance_nist.json (embedded)";

#[derive(Debug, Deserialize)]
struct IsotopeRecord {
    element_symbol: String,
    nominal_mass: u16,
    exact_mass: f64,
    abundance: f64,
    #[serde(default)]
    highest_abundance: Option<f64>,
}

#[derive(Debug, Clone, Default)]
/** The process-wide mapping from element symbol to isotope distribution.

Loaded once at startup from the embedded NIST table (or a user-supplied
file) and optionally overlaid with an enriched distribution for labelled
experiments. Read-only afterwards.
*/
pub struct IsotopeTable {
    elements: HashMap<String, Element, RandomState>,
}

impl IsotopeTable {
    /// The built-in natural-abundance table.
    pub fn natural() -> Result<Self> {
        Self::from_json(NATURAL_ISOTOPE_ABUNDANCE, "<built-in>")
    }

    /// Load a full table from a JSON file on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| MimiError::io(path.display().to_string(), e))?;
        Self::from_json(&text, &path.display().to_string())
    }

    /// Parse and validate a table from JSON text. `source` names the origin
    /// for diagnostics.
    pub fn from_json(text: &str, source: &str) -> Result<Self> {
        let mut table = Self::default();
        table.merge_json(text, source)?;
        Ok(table)
    }

    /// Overlay an alternative isotope distribution (e.g. a ¹³C-enriched
    /// label) on top of this table, replacing the elements it specifies.
    pub fn overlay(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .map_err(|e| MimiError::io(path.display().to_string(), e))?;
        self.merge_json(&text, &path.display().to_string())
    }

    /// Overlay from JSON text; same validation rules as a full load.
    pub fn overlay_json(&mut self, text: &str, source: &str) -> Result<()> {
        self.merge_json(text, source)
    }

    fn merge_json(&mut self, text: &str, source: &str) -> Result<()> {
        let raw: HashMap<String, Vec<IsotopeRecord>> = serde_json::from_str(text)
            .map_err(|e| MimiError::InvalidIsotopeData(format!("{source}: {e}")))?;
        for (symbol, records) in raw {
            let element = normalize_element(&symbol, records, source)?;
            self.elements.insert(symbol, element);
        }
        Ok(())
    }

    /// Look up an element, or fail with `UnknownElement`.
    pub fn get(&self, symbol: &str) -> Result<&Element> {
        self.elements
            .get(symbol)
            .ok_or_else(|| MimiError::UnknownElement(symbol.to_string()))
    }

    /// Exact mass of a specific isotope of an element.
    pub fn exact_mass(&self, symbol: &str, nominal_mass: u16) -> Result<f64> {
        self.get(symbol)?
            .exact_mass(nominal_mass)
            .ok_or_else(|| MimiError::NoSuchIsotope {
                symbol: symbol.to_string(),
                nominal_mass,
            })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.elements.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Sort the isotopes by descending abundance, annotate the element maximum
/// on every entry, and enforce the load-time invariants.
fn normalize_element(
    symbol: &str,
    records: Vec<IsotopeRecord>,
    source: &str,
) -> Result<Element> {
    if records.is_empty() {
        return Err(MimiError::InvalidIsotopeData(format!(
            "{source}: element '{symbol}' has no isotopes"
        )));
    }
    let mut isotopes: Vec<Isotope> = records
        .iter()
        .map(|rec| Isotope {
            element_symbol: rec.element_symbol.clone(),
            nominal_mass: rec.nominal_mass,
            exact_mass: rec.exact_mass,
            abundance: rec.abundance,
            max_abundance: 0.0,
        })
        .collect();
    isotopes.sort_by(|a, b| b.abundance.total_cmp(&a.abundance));

    let max = isotopes
        .iter()
        .map(|iso| iso.abundance)
        .fold(f64::MIN, f64::max);
    if isotopes[0].abundance != max {
        return Err(MimiError::InvalidIsotopeData(format!(
            "{source}: element '{symbol}' first isotope is not the most abundant"
        )));
    }
    let total: f64 = isotopes.iter().map(|iso| iso.abundance).sum();
    if total != 1.0 {
        return Err(MimiError::InvalidIsotopeData(format!(
            "{source}: element '{symbol}' abundances sum to {total:.17} instead of 1.0"
        )));
    }
    for rec in &records {
        if let Some(h) = rec.highest_abundance {
            if h != max {
                return Err(MimiError::InvalidIsotopeData(format!(
                    "{source}: element '{symbol}' has inconsistent highest_abundance values"
                )));
            }
        }
    }
    for iso in &mut isotopes {
        iso.max_abundance = max;
    }
    Ok(Element {
        symbol: symbol.to_string(),
        isotopes,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_natural_table_loads() {
        let table = IsotopeTable::natural().unwrap();
        assert!(table.len() > 80);
        for symbol in ["C", "H", "N", "O", "P", "S", "Na", "Cl", "Fe"] {
            assert!(table.contains(symbol), "missing {symbol}");
        }
    }

    #[test]
    fn test_invariants_hold() {
        let table = IsotopeTable::natural().unwrap();
        let carbon = table.get("C").unwrap();
        let total: f64 = carbon.isotopes.iter().map(|iso| iso.abundance).sum();
        assert_eq!(total, 1.0);
        assert_eq!(carbon.most_abundant().nominal_mass, 12);
        for iso in &carbon.isotopes {
            assert_eq!(iso.max_abundance, carbon.max_abundance());
        }
    }

    #[test]
    fn test_lookup() {
        let table = IsotopeTable::natural().unwrap();
        assert!((table.exact_mass("C", 13).unwrap() - 13.003355).abs() < 1e-9);
        assert!(matches!(
            table.get("Xx"),
            Err(MimiError::UnknownElement(_))
        ));
        assert!(matches!(
            table.exact_mass("C", 99),
            Err(MimiError::NoSuchIsotope { .. })
        ));
    }

    #[test]
    fn test_overlay_replaces_element() {
        let mut table = IsotopeTable::natural().unwrap();
        let label = r#"{
            "C": [
                {"element_symbol": "C", "nominal_mass": 13, "exact_mass": 13.003355, "abundance": 0.99},
                {"element_symbol": "C", "nominal_mass": 12, "exact_mass": 12.0, "abundance": 0.01}
            ]
        }"#;
        table.overlay_json(label, "label_13C").unwrap();
        let carbon = table.get("C").unwrap();
        assert_eq!(carbon.most_abundant().nominal_mass, 13);
        assert_eq!(carbon.max_abundance(), 0.99);
        // other elements untouched
        assert_eq!(table.get("H").unwrap().most_abundant().nominal_mass, 1);
    }

    #[test]
    fn test_bad_sum_rejected() {
        let bad = r#"{
            "C": [
                {"element_symbol": "C", "nominal_mass": 12, "exact_mass": 12.0, "abundance": 0.9},
                {"element_symbol": "C", "nominal_mass": 13, "exact_mass": 13.003355, "abundance": 0.09}
            ]
        }"#;
        assert!(matches!(
            IsotopeTable::from_json(bad, "test"),
            Err(MimiError::InvalidIsotopeData(_))
        ));
    }

    #[test]
    fn test_inconsistent_highest_rejected() {
        let bad = r#"{
            "C": [
                {"element_symbol": "C", "nominal_mass": 12, "exact_mass": 12.0, "abundance": 0.99, "highest_abundance": 0.99},
                {"element_symbol": "C", "nominal_mass": 13, "exact_mass": 13.003355, "abundance": 0.01, "highest_abundance": 0.5}
            ]
        }"#;
        assert!(matches!(
            IsotopeTable::from_json(bad, "test"),
            Err(MimiError::InvalidIsotopeData(_))
        ));
    }
}
