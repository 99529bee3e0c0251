//! Orchestrates matching of cached compounds against sample spectra and
//! assembles the tabular report.

use std::collections::HashMap;
use std::fmt;

use fnv::FnvBuildHasher as RandomState;
use indexmap::IndexMap;

use crate::cache::CompoundDatabase;
use crate::compound::Compound;
use crate::formula::{parse_formula, AtomCounts};
use crate::mass::{monoisotopic_mass, IonMode};
use crate::runlog::RunLog;
use crate::spectrum::Spectrum;
use crate::table::IsotopeTable;

/// Two same-id formulas are treated as equivalent when their neutral
/// monoisotopic masses agree within this window.
const CF_CONFLICT_MASS_TOLERANCE: f64 = 1e-6;

/// An observed isotopologue validates when the relative error between its
/// predicted abundance and the observed intensity ratio stays below this.
const VALIDATION_ERROR_RATE: f64 = 0.3;

/// A database column in a report row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DbCell {
    /// The compound's ion-adjusted monoisotopic mass; it matched a peak in
    /// at least one sample.
    Mass(f64),
    /// The id never appeared in this database.
    NoMappedId,
    /// Present in this database but matched in no sample.
    NoMassMatch,
    /// Same id, different formula, different mass across databases.
    CfConflict,
}

impl fmt::Display for DbCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbCell::Mass(mass) => write!(f, "{mass}"),
            DbCell::NoMappedId => f.write_str("NO_MAPPED_ID"),
            DbCell::NoMassMatch => f.write_str("NO_MASS_MATCH"),
            DbCell::CfConflict => f.write_str("CF_CONFLICT"),
        }
    }
}

/// A `(sample × database)` measurement cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleCell {
    pub measured_mass: f64,
    pub error_ppm: f64,
    pub intensity: f64,
    pub matched_isotope_count: usize,
}

/// One report row, keyed by compound id across all databases and samples.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub formula: String,
    pub id: String,
    pub name: String,
    pub counts: AtomCounts,
    /// One cell per database.
    pub db_cells: Vec<DbCell>,
    /// One optional cell per `(sample, database)`, sample-major.
    pub sample_cells: Vec<Option<SampleCell>>,
}

impl MatchRecord {
    /// Rows where no database produced a mass are omitted from the report.
    fn suppressed(&self) -> bool {
        self.db_cells
            .iter()
            .all(|cell| !matches!(cell, DbCell::Mass(_)))
    }
}

/// Matches every compound of every database against every sample and
/// collects [`MatchRecord`] rows in compound-id first-seen order.
pub struct Analyzer<'a> {
    table: &'a IsotopeTable,
    databases: &'a [(String, CompoundDatabase)],
    samples: &'a [Spectrum],
    /// Monoisotopic match tolerance as a unitless ratio (5 ppm = 5e-6).
    ppm: f64,
    /// Isotope verification tolerance, same unit.
    vppm: f64,
    records: IndexMap<String, MatchRecord>,
    cf_conflicts: usize,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        table: &'a IsotopeTable,
        databases: &'a [(String, CompoundDatabase)],
        samples: &'a [Spectrum],
        ppm: f64,
        vppm: f64,
    ) -> Self {
        Self {
            table,
            databases,
            samples,
            ppm,
            vppm,
            records: IndexMap::new(),
            cf_conflicts: 0,
        }
    }

    pub fn cf_conflicts(&self) -> usize {
        self.cf_conflicts
    }

    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.records.values()
    }

    /// Process every `(database, sample)` pair. The strategy per database
    /// depends on its size relative to the average sample size; both
    /// strategies produce identical records.
    pub fn run(&mut self, log: &mut RunLog) {
        let samples = self.samples;
        if samples.is_empty() {
            return;
        }
        let total_peaks: usize = samples.iter().map(Spectrum::len).sum();
        let avg_sample_size = total_peaks as f64 / samples.len() as f64;
        for d in 0..self.databases.len() {
            let db_size = self.databases[d].1.compounds.len();
            if db_size as f64 > 10.0 * avg_sample_size {
                self.database_dominated(d, log);
            } else {
                self.sample_dominated(d, log);
            }
        }
    }

    /// Default strategy: probe the peak index once per compound per sample.
    fn sample_dominated(&mut self, d: usize, log: &mut RunLog) {
        let databases = self.databases;
        let samples = self.samples;
        let db = &databases[d].1;
        for compound in db.compounds.values() {
            self.ensure_record(d, compound, log);
            for (s, sample) in samples.iter().enumerate() {
                let hits = sample.search(compound.mass, self.ppm);
                if let Some(&first) = hits.first() {
                    self.process_match(d, s, first, compound, log);
                }
            }
        }
    }

    /// For databases much larger than the samples: walk the peaks and pull
    /// candidate compounds from an integer-mass index, then validate in
    /// database insertion order so the report is deterministic.
    fn database_dominated(&mut self, d: usize, log: &mut RunLog) {
        let databases = self.databases;
        let samples = self.samples;
        let db = &databases[d].1;
        let compounds: Vec<&Compound> = db.compounds.values().collect();

        let mut mass_index: HashMap<i64, Vec<usize>, RandomState> = HashMap::default();
        for (ci, compound) in compounds.iter().enumerate() {
            let bin = compound.mass.floor() as i64;
            for b in (bin - 1)..=(bin + 1) {
                mass_index.entry(b).or_default().push(ci);
            }
        }

        // First pass: lowest matching peak index per (compound, sample).
        let mut matched: HashMap<(usize, usize), usize, RandomState> = HashMap::default();
        for (s, sample) in samples.iter().enumerate() {
            for (pi, peak) in sample.peaks().iter().enumerate() {
                let bin = peak.mass.floor() as i64;
                let Some(candidates) = mass_index.get(&bin) else {
                    continue;
                };
                for &ci in candidates {
                    let compound = compounds[ci];
                    if (peak.mass - compound.mass).abs() <= compound.mass * self.ppm {
                        matched.entry((ci, s)).or_insert(pi);
                    }
                }
            }
        }

        // Second pass in database order.
        for (ci, compound) in compounds.iter().enumerate() {
            self.ensure_record(d, compound, log);
            for s in 0..samples.len() {
                if let Some(&pi) = matched.get(&(ci, s)) {
                    self.process_match(d, s, pi, compound, log);
                }
            }
        }
    }

    /// Create the report row for a compound if absent, mark this database's
    /// column `NO_MASS_MATCH` (a later match upgrades it to the mass), and
    /// detect formula conflicts against the row's recorded formula.
    fn ensure_record(&mut self, d: usize, compound: &Compound, log: &mut RunLog) {
        let databases = self.databases;
        let n_dbs = databases.len();
        let n_samples = self.samples.len();
        let db_name = databases[d].0.as_str();

        if !self.records.contains_key(&compound.id) {
            self.records.insert(
                compound.id.clone(),
                MatchRecord {
                    formula: compound.formula.clone(),
                    id: compound.id.clone(),
                    name: compound.name.clone(),
                    counts: compound.parsed.atom_counts(),
                    db_cells: vec![DbCell::NoMappedId; n_dbs],
                    sample_cells: vec![None; n_samples * n_dbs],
                },
            );
        }

        let existing_formula = self.records[&compound.id].formula.clone();
        if existing_formula != compound.formula {
            let current_mass = self.formula_mass(&compound.formula);
            let existing_mass = self.formula_mass(&existing_formula);
            let conflict = match (current_mass, existing_mass) {
                (Some(a), Some(b)) => (a - b).abs() > CF_CONFLICT_MASS_TOLERANCE,
                _ => true,
            };
            if conflict {
                self.cf_conflicts += 1;
                log.write(&format!(
                    "CF_CONFLICT detected for compound ID: {}",
                    compound.id
                ));
                log.write(&format!(
                    "  Database {} ({}): {} (mass: {})",
                    d + 1,
                    db_name,
                    compound.formula,
                    format_mass(current_mass)
                ));
                log.write(&format!(
                    "  Existing entry: {} (mass: {})",
                    existing_formula,
                    format_mass(existing_mass)
                ));
                log.write(&format!("  Compound name: {}", compound.name));
                if let Some(record) = self.records.get_mut(&compound.id) {
                    record.db_cells[d] = DbCell::CfConflict;
                }
                return;
            }
            log.write(&format!(
                "INFO: formula representation difference for compound ID: {} \
                 ({} vs {}), same mass; keeping the earlier record",
                compound.id, compound.formula, existing_formula
            ));
        }
        if let Some(record) = self.records.get_mut(&compound.id) {
            record.db_cells[d] = DbCell::NoMassMatch;
        }
    }

    /// Neutral monoisotopic mass of a formula string, if it parses.
    fn formula_mass(&self, formula: &str) -> Option<f64> {
        parse_formula(formula, self.table)
            .ok()
            .map(|parsed| monoisotopic_mass(&parsed, IonMode::Neutral))
    }

    /// Validate the predicted isotopologues of a matched compound against
    /// the sample and fill in the `(sample, database)` cell.
    fn process_match(
        &mut self,
        d: usize,
        s: usize,
        peak_idx: usize,
        compound: &Compound,
        log: &mut RunLog,
    ) {
        let samples = self.samples;
        let n_dbs = self.databases.len();
        let sample = &samples[s];
        let peaks = sample.peaks();
        let p0 = peaks[peak_idx];

        if log.is_debug() {
            log.debug(&"-".repeat(80));
            log.debug(&format!(
                "{} ({}) matched {} in {}",
                compound.formula, compound.id, p0.mass, sample.path
            ));
        }

        let mut matched_isotope_count = 0usize;
        for isotopologue in compound.isotopologues.iter().skip(1) {
            let hits = sample.search(isotopologue.mass, self.vppm);
            if !hits.is_empty() {
                matched_isotope_count += 1;
            }
            for &h in &hits {
                let ratio = peaks[h].intensity / p0.intensity;
                let error_rate =
                    (isotopologue.abundance - ratio).abs() / isotopologue.abundance.abs();
                if log.is_debug() {
                    log.debug(&format!("{} : {}", isotopologue.label, isotopologue.mass));
                    log.debug(&format!(
                        "predicted abundance {} observed ratio {} / {} = {}",
                        isotopologue.abundance, peaks[h].intensity, p0.intensity, ratio
                    ));
                    log.debug(&format!("error rate: {error_rate}"));
                }
                if error_rate < VALIDATION_ERROR_RATE {
                    log.debug("valid hit (error rate < 0.3)");
                    break;
                }
                log.debug("invalid hit (error rate >= 0.3)");
            }
        }

        if let Some(record) = self.records.get_mut(&compound.id) {
            if !matches!(record.db_cells[d], DbCell::CfConflict) {
                record.db_cells[d] = DbCell::Mass(compound.mass);
            }
            let error_ppm = (compound.mass - p0.mass) / compound.mass * 1e6;
            record.sample_cells[s * n_dbs + d] = Some(SampleCell {
                measured_mass: p0.mass,
                error_ppm,
                intensity: p0.intensity,
                matched_isotope_count,
            });
        }
    }

    /// Render the report TSV. `log_file` is the path written on the first
    /// line.
    pub fn report(&self, log_file: &str) -> String {
        let n_dbs = self.databases.len();
        let base_columns = 9 + n_dbs;
        let mut out = String::new();
        out.push_str(&format!("Log file\t{log_file}\n"));
        if n_dbs == 0 {
            return out;
        }

        // Per-sample group header.
        let mut row: Vec<String> = vec![String::new(); base_columns];
        for sample in self.samples {
            row.push(sample.path.clone());
            row.extend(std::iter::repeat_n(String::new(), 3 + 4 * (n_dbs - 1)));
        }
        out.push_str(&row.join("\t"));
        out.push('\n');

        // Per-database sub-header, only when more than one database.
        if n_dbs > 1 {
            let mut row: Vec<String> = vec![String::new(); base_columns];
            for _ in self.samples {
                for (name, _) in self.databases {
                    row.push(name.clone());
                    row.extend(std::iter::repeat_n(String::new(), 3));
                }
            }
            out.push_str(&row.join("\t"));
            out.push('\n');
        }

        // Column names.
        let mut names: Vec<String> = ["CF", "ID", "Name", "C", "H", "N", "O", "P", "S"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for (name, _) in self.databases {
            names.push(format!("{name}_mass"));
        }
        for _ in self.samples {
            for _ in 0..n_dbs {
                names.extend(
                    ["mass_measured", "error_ppm", "intensity", "iso_count"]
                        .iter()
                        .map(|s| s.to_string()),
                );
            }
        }
        out.push_str(&names.join("\t"));
        out.push('\n');

        for record in self.records.values() {
            if record.suppressed() {
                continue;
            }
            let counts = record.counts;
            let mut cells: Vec<String> = vec![
                record.formula.clone(),
                record.id.clone(),
                record.name.clone(),
                counts.c.to_string(),
                counts.h.to_string(),
                counts.n.to_string(),
                counts.o.to_string(),
                counts.p.to_string(),
                counts.s.to_string(),
            ];
            for cell in &record.db_cells {
                cells.push(cell.to_string());
            }
            for sample_cell in &record.sample_cells {
                match sample_cell {
                    Some(cell) => {
                        cells.push(cell.measured_mass.to_string());
                        cells.push(cell.error_ppm.to_string());
                        cells.push(cell.intensity.to_string());
                        cells.push(cell.matched_isotope_count.to_string());
                    }
                    None => cells.extend(std::iter::repeat_n(String::new(), 4)),
                }
            }
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn format_mass(mass: Option<f64>) -> String {
    match mass {
        Some(mass) => format!("{mass:.6}"),
        None => "unparseable".to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::CacheMetadata;
    use crate::isotopologue::{isotopologue_variants, DEFAULT_NOISE_CUTOFF};
    use crate::spectrum::Peak;

    fn metadata() -> CacheMetadata {
        CacheMetadata {
            creation_date: "2026-01-01T00:00:00".to_string(),
            version: "test".to_string(),
            ionization_mode: IonMode::Positive,
            full_command: "test".to_string(),
            compound_db_files: Vec::new(),
            isotope_data_file: "embedded".to_string(),
            labeled_atoms_file: None,
            cache_output_file: "test".to_string(),
            noise_cutoff: DEFAULT_NOISE_CUTOFF,
        }
    }

    fn compound(table: &IsotopeTable, formula: &str, id: &str, name: &str) -> Compound {
        let parsed = parse_formula(formula, table).unwrap();
        let mass = monoisotopic_mass(&parsed, IonMode::Positive);
        let isotopologues = isotopologue_variants(&parsed, IonMode::Positive, DEFAULT_NOISE_CUTOFF);
        Compound {
            id: id.to_string(),
            formula: formula.to_string(),
            name: name.to_string(),
            parsed,
            mass,
            isotopologues,
        }
    }

    fn database(table: &IsotopeTable, name: &str, specs: &[(&str, &str, &str)]) -> (String, CompoundDatabase) {
        let mut compounds = IndexMap::new();
        for (formula, id, cname) in specs {
            compounds.insert(id.to_string(), compound(table, formula, id, cname));
        }
        (
            name.to_string(),
            CompoundDatabase {
                metadata: metadata(),
                compounds,
            },
        )
    }

    fn spectrum(peaks: &[(f64, f64)]) -> Spectrum {
        Spectrum::new(
            "sample.asc",
            peaks
                .iter()
                .map(|&(mass, intensity)| Peak { mass, intensity })
                .collect(),
        )
    }

    #[test]
    fn test_glucose_match_with_isotope_count() {
        let table = IsotopeTable::natural().unwrap();
        let databases = vec![database(&table, "db1", &[("C6H12O6", "G1", "glucose")])];
        let samples = vec![spectrum(&[(181.0707, 1.0e6), (182.0740, 1.1e4)])];
        let mut analyzer = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        analyzer.run(&mut RunLog::sink());

        let records: Vec<&MatchRecord> = analyzer.records().collect();
        assert_eq!(records.len(), 1);
        let record = records[0];
        assert!(matches!(record.db_cells[0], DbCell::Mass(_)));
        let cell = record.sample_cells[0].as_ref().unwrap();
        assert_eq!(cell.measured_mass, 181.0707);
        assert!(cell.matched_isotope_count >= 1);
        assert!(cell.error_ppm.abs() < 5.0);
        // the observed M+1 ratio (0.011) is far from the predicted ~0.065,
        // so the match counts but does not validate; iso_count still records it
        assert_eq!(cell.intensity, 1.0e6);
    }

    #[test]
    fn test_unmatched_compound_suppressed() {
        let table = IsotopeTable::natural().unwrap();
        let databases = vec![database(
            &table,
            "db1",
            &[("C6H12O6", "G1", "glucose"), ("NaCl", "S1", "salt")],
        )];
        let samples = vec![spectrum(&[(181.0707, 1.0e6)])];
        let mut analyzer = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        analyzer.run(&mut RunLog::sink());

        let report = analyzer.report("log/test.log");
        assert!(report.contains("G1"));
        assert!(!report.contains("S1"));
    }

    #[test]
    fn test_cf_conflict_between_databases() {
        let table = IsotopeTable::natural().unwrap();
        let databases = vec![
            database(&table, "db1", &[("C6H12O6", "X1", "hexose")]),
            database(&table, "db2", &[("C5H10O5", "X1", "pentose")]),
        ];
        let samples = vec![spectrum(&[(181.0707, 1.0e6)])];
        let mut analyzer = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        analyzer.run(&mut RunLog::sink());

        assert_eq!(analyzer.cf_conflicts(), 1);
        let record = analyzer.records().next().unwrap();
        assert!(matches!(record.db_cells[0], DbCell::Mass(_)));
        assert_eq!(record.db_cells[1], DbCell::CfConflict);
        // the conflicted column stays CF_CONFLICT in the rendered report
        let report = analyzer.report("log/test.log");
        assert!(report.contains("CF_CONFLICT"));
    }

    #[test]
    fn test_no_mapped_id_column() {
        let table = IsotopeTable::natural().unwrap();
        let databases = vec![
            database(
                &table,
                "db1",
                &[("C6H12O6", "G1", "glucose"), ("H2O", "W1", "water")],
            ),
            database(&table, "db2", &[("C6H12O6", "G1", "glucose")]),
        ];
        let water_pos = {
            let parsed = parse_formula("H2O", &table).unwrap();
            monoisotopic_mass(&parsed, IonMode::Positive)
        };
        let samples = vec![spectrum(&[(water_pos, 5.0e5), (181.0707, 1.0e6)])];
        let mut analyzer = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        analyzer.run(&mut RunLog::sink());

        let record = analyzer
            .records()
            .find(|r| r.id == "W1")
            .expect("water row present");
        assert!(matches!(record.db_cells[0], DbCell::Mass(_)));
        assert_eq!(record.db_cells[1], DbCell::NoMappedId);
    }

    #[test]
    fn test_both_strategies_agree() {
        let table = IsotopeTable::natural().unwrap();
        let databases = vec![database(
            &table,
            "db1",
            &[
                ("C6H12O6", "G1", "glucose"),
                ("NaCl", "S1", "salt"),
                ("C2H6", "E1", "ethane"),
            ],
        )];
        let samples = vec![
            spectrum(&[(31.0542, 2.0e5), (181.0707, 1.0e6), (182.0740, 1.1e4)]),
            spectrum(&[(181.0708, 8.0e5)]),
        ];

        let mut by_sample = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        by_sample.sample_dominated(0, &mut RunLog::sink());
        let mut by_database = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        by_database.database_dominated(0, &mut RunLog::sink());

        assert_eq!(
            by_sample.report("log/x.log"),
            by_database.report("log/x.log")
        );
    }

    #[test]
    fn test_report_layout() {
        let table = IsotopeTable::natural().unwrap();
        let databases = vec![
            database(&table, "dbA", &[("C6H12O6", "G1", "glucose")]),
            database(&table, "dbB", &[("C6H12O6", "G1", "glucose")]),
        ];
        let samples = vec![spectrum(&[(181.0707, 1.0e6)])];
        let mut analyzer = Analyzer::new(&table, &databases, &samples, 5e-6, 5e-6);
        analyzer.run(&mut RunLog::sink());

        let report = analyzer.report("log/run.log");
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Log file\tlog/run.log");
        assert!(lines[1].contains("sample.asc"));
        assert!(lines[2].contains("dbA") && lines[2].contains("dbB"));
        let header: Vec<&str> = lines[3].split('\t').collect();
        assert_eq!(&header[..9], &["CF", "ID", "Name", "C", "H", "N", "O", "P", "S"]);
        assert_eq!(header[9], "dbA_mass");
        assert_eq!(header[10], "dbB_mass");
        // 9 fixed + 2 db columns + 1 sample * 2 dbs * 4 fields
        assert_eq!(header.len(), 9 + 2 + 8);
        let row: Vec<&str> = lines[4].split('\t').collect();
        assert_eq!(row.len(), header.len());
        assert_eq!(row[0], "C6H12O6");
        assert_eq!(row[3], "6");
    }
}
