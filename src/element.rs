use std::cmp;
use std::fmt;
use std::hash;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/** A known isotope of an element with a known nominal mass, exact mass,
and natural abundance.

`max_abundance` replicates the abundance of the element's most abundant
isotope on every entry so that relative-abundance ratios can be computed
without going back to the [`Element`].
*/
pub struct Isotope {
    pub element_symbol: String,
    pub nominal_mass: u16,
    pub exact_mass: f64,
    pub abundance: f64,
    pub max_abundance: f64,
}

impl Isotope {
    /// Whether this is the reference (most abundant) isotope of its element.
    #[inline]
    pub fn is_most_abundant(&self) -> bool {
        self.abundance == self.max_abundance
    }
}

impl fmt::Display for Isotope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]{}", self.nominal_mass, self.element_symbol)
    }
}

impl hash::Hash for Isotope {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.element_symbol.hash(state);
        self.nominal_mass.hash(state);
    }
}

impl cmp::PartialEq for Isotope {
    fn eq(&self, other: &Isotope) -> bool {
        self.element_symbol == other.element_symbol && self.nominal_mass == other.nominal_mass
    }
}

impl cmp::PartialOrd for Isotope {
    fn partial_cmp(&self, other: &Isotope) -> Option<cmp::Ordering> {
        self.exact_mass.partial_cmp(&other.exact_mass)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/** A chemical element with its isotopes sorted by descending abundance.

Invariants established by [`IsotopeTable`](crate::IsotopeTable) at load
time: the isotope list is non-empty, the first entry is the most abundant,
the abundances sum bit-exactly to 1.0, and every entry carries the same
`max_abundance`.
*/
pub struct Element {
    pub symbol: String,
    pub isotopes: Vec<Isotope>,
}

impl Element {
    /// The reference isotope, i.e. the first (most abundant) entry.
    #[inline]
    pub fn most_abundant(&self) -> &Isotope {
        &self.isotopes[0]
    }

    /// Exact mass of the most abundant isotope.
    #[inline]
    pub fn mass(&self) -> f64 {
        self.isotopes[0].exact_mass
    }

    #[inline]
    pub fn max_abundance(&self) -> f64 {
        self.isotopes[0].abundance
    }

    /// Exact mass of the isotope with the given nominal mass, if present.
    pub fn exact_mass(&self, nominal_mass: u16) -> Option<f64> {
        self.isotopes
            .iter()
            .find(|iso| iso.nominal_mass == nominal_mass)
            .map(|iso| iso.exact_mass)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Element({}, {}, {})",
            self.symbol,
            self.isotopes[0],
            self.isotopes.len()
        )
    }
}

impl hash::Hash for Element {
    #[inline]
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
    }
}

impl cmp::PartialEq for Element {
    #[inline]
    fn eq(&self, other: &Element) -> bool {
        self.symbol == other.symbol
            && self.isotopes[0].nominal_mass == other.isotopes[0].nominal_mass
    }
}
