/*!
A library for identifying candidate chemical compounds behind mass
spectrometry peaks: formula parsing, isotopologue enumeration with
predicted relative abundances, and tolerance-windowed peak matching.

## Formulas and masses
```
# fn main() -> Result<(), Box<dyn std::error::Error>> {
use mimi::{monoisotopic_mass, parse_formula, IonMode, IsotopeTable};

let table = IsotopeTable::natural()?;
let glucose = parse_formula("C6H12O6", &table)?;
assert!((monoisotopic_mass(&glucose, IonMode::Neutral) - 180.06339).abs() < 1e-4);
# Ok(())
# }
```
## Isotopologue patterns
```
# fn main() -> Result<(), Box<dyn std::error::Error>> {
use mimi::{isotopologue_variants, parse_formula, IonMode, IsotopeTable, DEFAULT_NOISE_CUTOFF};

let table = IsotopeTable::natural()?;
let ethane = parse_formula("C2H6", &table)?;
let variants = isotopologue_variants(&ethane, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
assert_eq!(variants[0].abundance, 1.0);
assert!(variants[1].abundance < 1.0);
# Ok(())
# }
```
*/
mod analysis;
mod cache;
mod compound;
mod element;
mod error;
mod formula;
mod isotopologue;
mod mass;
mod runlog;
mod spectrum;
mod table;

pub use crate::analysis::{Analyzer, DbCell, MatchRecord, SampleCell};
pub use crate::cache::{CacheMetadata, CompoundDatabase};
pub use crate::compound::{load_compound_rows, Compound, CompoundRow};
pub use crate::element::{Element, Isotope};
pub use crate::error::{MimiError, Result};
pub use crate::formula::{parse_formula, AtomCounts, FormulaTerm, ParsedFormula};
pub use crate::isotopologue::{isotopologue_variants, Isotopologue, DEFAULT_NOISE_CUTOFF};
pub use crate::mass::{assignment_mass, monoisotopic_mass, IonMode, PROTON};
pub use crate::runlog::RunLog;
pub use crate::spectrum::{Peak, PeakIndex, Spectrum};
pub use crate::table::{IsotopeTable, NATURAL_TABLE_NAME};
