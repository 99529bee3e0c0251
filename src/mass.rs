use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::element::Isotope;
use crate::formula::ParsedFormula;

/// Mass of a proton in Daltons.
pub const PROTON: f64 = 1.007276467;

/// Ionization mode: shifts a neutral mass by ± one proton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum IonMode {
    #[value(name = "pos")]
    Positive,
    #[value(name = "neg")]
    Negative,
    #[value(skip)]
    Neutral,
}

impl IonMode {
    #[inline]
    pub fn adjust(&self, mass: f64) -> f64 {
        match self {
            IonMode::Positive => mass + PROTON,
            IonMode::Negative => mass - PROTON,
            IonMode::Neutral => mass,
        }
    }
}

impl fmt::Display for IonMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            IonMode::Positive => "pos",
            IonMode::Negative => "neg",
            IonMode::Neutral => "zero",
        })
    }
}

/// Monoisotopic mass of a parsed formula: every atom taken as its
/// element's most abundant isotope, adjusted for the ion mode.
pub fn monoisotopic_mass(formula: &ParsedFormula, ion: IonMode) -> f64 {
    let mut mass = 0.0;
    for term in formula.terms() {
        mass += term.element.most_abundant().exact_mass * f64::from(term.count);
    }
    ion.adjust(mass)
}

/// Exact mass of a specific isotope assignment, adjusted for the ion mode.
pub fn assignment_mass(assignment: &[(&Isotope, u32)], ion: IonMode) -> f64 {
    let mut mass = 0.0;
    for (isotope, count) in assignment {
        mass += isotope.exact_mass * f64::from(*count);
    }
    ion.adjust(mass)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::formula::parse_formula;
    use crate::table::IsotopeTable;

    #[test]
    fn test_glucose_masses() {
        let table = IsotopeTable::natural().unwrap();
        let glucose = parse_formula("C6H12O6", &table).unwrap();
        assert!((monoisotopic_mass(&glucose, IonMode::Neutral) - 180.0634).abs() < 1e-4);
        assert!((monoisotopic_mass(&glucose, IonMode::Positive) - 181.0707).abs() < 1e-4);
        assert!((monoisotopic_mass(&glucose, IonMode::Negative) - 179.0561).abs() < 1e-4);
    }

    #[test]
    fn test_assignment_matches_monoisotopic() {
        let table = IsotopeTable::natural().unwrap();
        let water = parse_formula("H2O", &table).unwrap();
        let assignment: Vec<_> = water
            .terms()
            .iter()
            .map(|t| (t.element.most_abundant(), t.count))
            .collect();
        assert_eq!(
            assignment_mass(&assignment, IonMode::Negative),
            monoisotopic_mass(&water, IonMode::Negative)
        );
    }
}
