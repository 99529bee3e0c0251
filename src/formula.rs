use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::error::{MimiError, Result};
use crate::table::IsotopeTable;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One `(element, count)` term of a parsed molecular formula. The element
/// data is owned so that parsed formulas survive in caches without a
/// reference back to the table they were parsed against.
pub struct FormulaTerm {
    pub element: Element,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/** A molecular formula parsed into an ordered `(element, count)` sequence.

Source order is preserved and duplicate element symbols produce duplicate
terms; `"CHC"` is three terms, not `C2H`.
*/
pub struct ParsedFormula {
    terms: Vec<FormulaTerm>,
}

/// Atom counts of the six elements reported per compound row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtomCounts {
    pub c: u32,
    pub h: u32,
    pub n: u32,
    pub o: u32,
    pub p: u32,
    pub s: u32,
}

impl ParsedFormula {
    pub fn terms(&self) -> &[FormulaTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// C/H/N/O/P/S counts for the report columns. When a symbol repeats,
    /// the last occurrence wins.
    pub fn atom_counts(&self) -> AtomCounts {
        let mut counts = AtomCounts::default();
        for term in &self.terms {
            match term.element.symbol.as_str() {
                "C" => counts.c = term.count,
                "H" => counts.h = term.count,
                "N" => counts.n = term.count,
                "O" => counts.o = term.count,
                "P" => counts.p = term.count,
                "S" => counts.s = term.count,
                _ => {}
            }
        }
        counts
    }

    /// Re-serialize by concatenating `element + count` (count omitted when 1).
    pub fn to_formula_string(&self) -> String {
        let mut out = String::with_capacity(self.terms.len() * 3);
        for term in &self.terms {
            out.push_str(&term.element.symbol);
            if term.count > 1 {
                out.push_str(&term.count.to_string());
            }
        }
        out
    }
}

/// Parse a formula string such as `"C6H12O6"` or `"NaCl"` against an
/// isotope table.
///
/// The grammar is a sequence of tokens, each one uppercase letter,
/// optionally one lowercase letter, optionally a positive decimal count
/// (absent means 1). Parentheses, charges, and isotopic brackets are not
/// supported; any non-conforming token or symbol absent from the table
/// fails with `UnknownElement`.
pub fn parse_formula(input: &str, table: &IsotopeTable) -> Result<ParsedFormula> {
    let bytes = input.as_bytes();
    if bytes.is_empty() {
        return Err(MimiError::UnknownElement(String::new()));
    }
    let mut terms = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_uppercase() {
            return Err(MimiError::UnknownElement(
                input[i..].chars().take(1).collect(),
            ));
        }
        let start = i;
        i += 1;
        if i < bytes.len() && bytes[i].is_ascii_lowercase() {
            i += 1;
        }
        let symbol = &input[start..i];
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let count = if digits_start == i {
            1
        } else {
            input[digits_start..i]
                .parse::<u32>()
                .map_err(|_| MimiError::UnknownElement(input[start..i].to_string()))?
        };
        if count == 0 {
            return Err(MimiError::UnknownElement(input[start..i].to_string()));
        }
        let element = table.get(symbol)?.clone();
        terms.push(FormulaTerm { element, count });
    }
    Ok(ParsedFormula { terms })
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> IsotopeTable {
        IsotopeTable::natural().unwrap()
    }

    #[test]
    fn test_glucose() {
        let parsed = parse_formula("C6H12O6", &table()).unwrap();
        let symbols: Vec<(&str, u32)> = parsed
            .terms()
            .iter()
            .map(|t| (t.element.symbol.as_str(), t.count))
            .collect();
        assert_eq!(symbols, vec![("C", 6), ("H", 12), ("O", 6)]);
    }

    #[test]
    fn test_two_letter_elements() {
        let parsed = parse_formula("NaCl", &table()).unwrap();
        let symbols: Vec<(&str, u32)> = parsed
            .terms()
            .iter()
            .map(|t| (t.element.symbol.as_str(), t.count))
            .collect();
        assert_eq!(symbols, vec![("Na", 1), ("Cl", 1)]);
    }

    #[test]
    fn test_unknown_element() {
        assert!(matches!(
            parse_formula("Xx2", &table()),
            Err(MimiError::UnknownElement(_))
        ));
    }

    #[test]
    fn test_non_conforming_tokens() {
        let t = table();
        assert!(parse_formula("2H", &t).is_err());
        assert!(parse_formula("hO", &t).is_err());
        assert!(parse_formula("C0", &t).is_err());
        assert!(parse_formula("", &t).is_err());
    }

    #[test]
    fn test_duplicates_kept_in_order() {
        let parsed = parse_formula("CHC", &table()).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.terms()[2].element.symbol, "C");
    }

    #[test]
    fn test_round_trip() {
        let t = table();
        for formula in ["C6H12O6", "NaCl", "C2H6", "C34H53O15N7"] {
            let parsed = parse_formula(formula, &t).unwrap();
            assert_eq!(parsed.to_formula_string(), formula);
        }
    }

    #[test]
    fn test_atom_counts() {
        let parsed = parse_formula("C6H12O6", &table()).unwrap();
        let counts = parsed.atom_counts();
        assert_eq!(
            (counts.c, counts.h, counts.n, counts.o, counts.p, counts.s),
            (6, 12, 0, 6, 0, 0)
        );
    }
}
