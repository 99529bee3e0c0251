//! Expansion of a molecular formula into its distinguishable
//! isotope-substitution variants with predicted relative abundances.

use std::fmt::Write;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::element::Isotope;
use crate::formula::ParsedFormula;
use crate::mass::{assignment_mass, IonMode};

/// Default noise cutoff; variants below `1 / cutoff` relative abundance are
/// pruned inside the per-element loop.
pub const DEFAULT_NOISE_CUTOFF: f64 = 1e5;

/// Product points whose total predicted abundance falls below this floor
/// are dropped.
const ABUNDANCE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One isotope-substitution variant of a molecule: its exact mass, its
/// predicted abundance relative to the monoisotopic variant (which is
/// always 1.0), and a human-readable label such as `"[12]C6 [1]H12 [16]O6"`.
pub struct Isotopologue {
    pub mass: f64,
    pub abundance: f64,
    pub label: String,
}

/// A per-element partition: how many atoms of the element are assigned to
/// each distinct isotope. Counts sum to the element's atom count.
type Partition<'a> = Vec<(&'a Isotope, u32)>;

/// Enumerate the isotopologues of a parsed formula.
///
/// The monoisotopic variant is always first with abundance 1.0; the rest
/// are sorted by descending predicted abundance. Per-element partitions
/// are pruned as soon as any isotope group's `(abundance/max)^count` drops
/// below `1 / noise_cutoff`, and the cross-element product is streamed so
/// the full combination space is never materialized.
pub fn isotopologue_variants(
    formula: &ParsedFormula,
    ion: IonMode,
    noise_cutoff: f64,
) -> Vec<Isotopologue> {
    if formula.is_empty() {
        return Vec::new();
    }
    let floor = 1.0 / noise_cutoff;

    let per_element: Vec<Vec<Partition<'_>>> = formula
        .terms()
        .iter()
        .map(|term| element_partitions(&term.element.isotopes, term.count, floor))
        .collect();
    if per_element.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let mut variants: Vec<Isotopologue> = Vec::new();
    for point in per_element
        .iter()
        .map(|partitions| partitions.iter())
        .multi_cartesian_product()
    {
        let mut abundance = 1.0;
        let mut label = String::new();
        let mut assignment: Vec<(&Isotope, u32)> = Vec::new();
        for partition in &point {
            let element_atoms: u32 = partition.iter().map(|&(_, count)| count).sum();
            for &(isotope, count) in partition.iter() {
                assignment.push((isotope, count));
                if !isotope.is_most_abundant() {
                    abundance *= (isotope.abundance / isotope.max_abundance).powi(count as i32)
                        * f64::from(element_atoms);
                }
                let _ = write!(
                    label,
                    "[{}]{}{} ",
                    isotope.nominal_mass, isotope.element_symbol, count
                );
            }
        }
        if abundance < ABUNDANCE_FLOOR {
            continue;
        }
        let mass = assignment_mass(&assignment, ion);
        variants.push(Isotopologue {
            mass,
            abundance,
            label: label.trim_end().to_string(),
        });
    }

    // Monoisotopic variant stays first; the tail sorts by descending
    // abundance (stable, so product order breaks ties).
    if variants.len() > 2 {
        variants[1..].sort_by(|a, b| b.abundance.total_cmp(&a.abundance));
    }
    variants
}

/// All multisets of `count` atoms over the element's isotopes that survive
/// the per-group abundance pruning, as grouped partitions. The first
/// partition is always the all-monoisotopic one.
fn element_partitions(isotopes: &[Isotope], count: u32, floor: f64) -> Vec<Partition<'_>> {
    let mut partitions = Vec::new();
    for combo in (0..isotopes.len()).combinations_with_replacement(count as usize) {
        let mut partition: Partition = Vec::new();
        let mut keep = true;
        let mut i = 0;
        while i < combo.len() {
            let isotope_idx = combo[i];
            let mut group_count = 0u32;
            while i < combo.len() && combo[i] == isotope_idx {
                group_count += 1;
                i += 1;
            }
            let isotope = &isotopes[isotope_idx];
            let ratio =
                (isotope.abundance / isotope.max_abundance).powi(group_count as i32);
            if ratio < floor {
                keep = false;
                break;
            }
            partition.push((isotope, group_count));
        }
        if keep {
            partitions.push(partition);
        }
    }
    partitions
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::formula::parse_formula;
    use crate::mass::monoisotopic_mass;
    use crate::table::IsotopeTable;

    fn table() -> IsotopeTable {
        IsotopeTable::natural().unwrap()
    }

    #[test]
    fn test_monoisotopic_first_and_reference() {
        let glucose = parse_formula("C6H12O6", &table()).unwrap();
        let variants = isotopologue_variants(&glucose, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        assert_eq!(variants[0].abundance, 1.0);
        assert_eq!(
            variants[0].mass,
            monoisotopic_mass(&glucose, IonMode::Positive)
        );
        assert_eq!(variants[0].label, "[12]C6 [1]H12 [16]O6");
    }

    #[test]
    fn test_tail_sorted_descending() {
        let glucose = parse_formula("C6H12O6", &table()).unwrap();
        let variants = isotopologue_variants(&glucose, IonMode::Negative, DEFAULT_NOISE_CUTOFF);
        for pair in variants[1..].windows(2) {
            assert!(pair[0].abundance >= pair[1].abundance);
        }
        for variant in &variants[1..] {
            assert!(variant.abundance >= 1e-6);
            assert!(variant.abundance < 1.0);
        }
    }

    #[test]
    fn test_ethane_pruning() {
        let ethane = parse_formula("C2H6", &table()).unwrap();
        let variants = isotopologue_variants(&ethane, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        // monoisotopic + [13]C1 + [13]C2 + [2]H1 + [13]C1[2]H1
        assert_eq!(variants.len(), 5);
        for variant in &variants[1..] {
            assert!(
                variant.label.contains("[13]C") || variant.label.contains("[2]H"),
                "unexpected variant {}",
                variant.label
            );
            assert!(variant.abundance >= 1e-6);
        }
    }

    #[test]
    fn test_singly_substituted_scales_with_atom_count() {
        let t = table();
        let c2 = parse_formula("C2", &t).unwrap();
        let c4 = parse_formula("C4", &t).unwrap();
        let v2 = isotopologue_variants(&c2, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        let v4 = isotopologue_variants(&c4, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        // one [13]C substitution weighs (a/A) * n
        assert!((v4[1].abundance / v2[1].abundance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_glucose_m_plus_one_abundance() {
        let glucose = parse_formula("C6H12O6", &table()).unwrap();
        let variants = isotopologue_variants(&glucose, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        // the [13]C1 variant is the most abundant substitution for glucose
        let m1 = &variants[1];
        assert!(m1.label.contains("[13]C1"));
        assert!((m1.abundance - 0.0649).abs() < 1e-3);
    }

    #[test]
    fn test_overlay_changes_reference() {
        let mut t = table();
        t.overlay_json(
            r#"{"C": [
                {"element_symbol": "C", "nominal_mass": 13, "exact_mass": 13.003355, "abundance": 0.99},
                {"element_symbol": "C", "nominal_mass": 12, "exact_mass": 12.0, "abundance": 0.01}
            ]}"#,
            "label",
        )
        .unwrap();
        let c2 = parse_formula("C2", &t).unwrap();
        let variants = isotopologue_variants(&c2, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        assert_eq!(variants[0].label, "[13]C2");
        assert_eq!(variants[0].abundance, 1.0);
    }
}
