use std::path::PathBuf;

use chrono::Local;
use clap::Args;
use indexmap::IndexMap;
use rayon::prelude::*;

use mimi::{
    isotopologue_variants, load_compound_rows, monoisotopic_mass, parse_formula, CacheMetadata,
    Compound, CompoundDatabase, CompoundRow, IonMode, IsotopeTable, MimiError, Result, RunLog,
    DEFAULT_NOISE_CUTOFF, NATURAL_TABLE_NAME,
};

#[derive(Args, Debug)]
pub struct CacheCreateArgs {
    /// Ionisation mode
    #[arg(short = 'i', long = "ion", value_enum)]
    pub ion: IonMode,

    /// Labelled atoms overlay (JSON, same schema as the isotope table)
    #[arg(short = 'l', long = "label", value_name = "JSON")]
    pub label: Option<PathBuf>,

    /// Compound database TSV file(s)
    #[arg(short = 'd', long = "dbfile", value_name = "DBTSV", num_args = 1.., required = true)]
    pub dbfiles: Vec<PathBuf>,

    /// Noise cutoff: isotopologues below 1/CUTOFF relative abundance are
    /// pruned per element
    #[arg(short = 'n', long = "noise", value_name = "CUTOFF", default_value_t = DEFAULT_NOISE_CUTOFF)]
    pub noise_cutoff: f64,

    /// Output cache file
    #[arg(short = 'c', long = "cache", value_name = "DBBINARY")]
    pub cache: PathBuf,

    /// Write per-compound enumeration details to a debug file
    #[arg(short = 'g', long = "debug", hide = true)]
    pub debug: bool,
}

pub fn run(args: &CacheCreateArgs, full_command: &str) -> Result<()> {
    let mut table = IsotopeTable::natural()?;
    if let Some(label) = &args.label {
        table.overlay(label)?;
    }

    let mut rows = Vec::new();
    for dbfile in &args.dbfiles {
        rows.extend(load_compound_rows(dbfile)?);
    }

    let mut log = if args.debug {
        Some(RunLog::create(&args.cache, true)?)
    } else {
        None
    };

    // Enumeration is pure per compound given the shared read-only table,
    // so it fans out; results are assembled back in input order.
    let built: Vec<std::result::Result<Compound, (CompoundRow, MimiError)>> = rows
        .par_iter()
        .map(|row| build_compound(row, &table, args.ion, args.noise_cutoff))
        .collect();

    let mut compounds = IndexMap::new();
    let mut skipped: Vec<String> = Vec::new();
    for result in built {
        match result {
            Ok(compound) => {
                if let Some(log) = &mut log {
                    log.debug(&format!(
                        "\nProcessing compound: {} ({})",
                        compound.formula, compound.id
                    ));
                    log.debug(&"-".repeat(50));
                    log.debug(&format!(
                        "Monoisotopic mass ({} mode): {}",
                        args.ion, compound.mass
                    ));
                    for isotopologue in &compound.isotopologues {
                        log.debug(&format!(
                            "{},{:.6},{:.6}",
                            isotopologue.label, isotopologue.mass, isotopologue.abundance
                        ));
                    }
                }
                compounds.insert(compound.id.clone(), compound);
            }
            Err((row, err)) => {
                if let Some(log) = &mut log {
                    log.debug(&format!(
                        "ERROR: unsupported molecular formula '{}' ({}): {}",
                        row.formula, row.id, err
                    ));
                }
                skipped.push(row.formula);
            }
        }
    }

    if let Some(log) = &mut log {
        if !skipped.is_empty() {
            log.debug("\nSummary of skipped compounds:");
            log.debug(&"-".repeat(30));
            for formula in &skipped {
                log.debug(&format!("- {formula}"));
            }
            log.debug(&format!("\nTotal skipped: {}", skipped.len()));
        }
    }

    let metadata = CacheMetadata {
        creation_date: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ionization_mode: args.ion,
        full_command: full_command.to_string(),
        compound_db_files: args
            .dbfiles
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        isotope_data_file: NATURAL_TABLE_NAME.to_string(),
        labeled_atoms_file: args.label.as_ref().map(|p| p.display().to_string()),
        cache_output_file: args.cache.display().to_string(),
        noise_cutoff: args.noise_cutoff,
    };
    let database = CompoundDatabase {
        metadata,
        compounds,
    };
    database.write(&args.cache)?;
    println!(
        "Wrote {} compounds to {} ({} skipped)",
        database.compounds.len(),
        args.cache.display(),
        skipped.len()
    );
    Ok(())
}

fn build_compound(
    row: &CompoundRow,
    table: &IsotopeTable,
    ion: IonMode,
    noise_cutoff: f64,
) -> std::result::Result<Compound, (CompoundRow, MimiError)> {
    let parsed = parse_formula(&row.formula, table).map_err(|e| (row.clone(), e))?;
    let mass = monoisotopic_mass(&parsed, ion);
    let isotopologues = isotopologue_variants(&parsed, ion, noise_cutoff);
    Ok(Compound {
        id: row.id.clone(),
        formula: row.formula.clone(),
        name: row.name.clone(),
        parsed,
        mass,
        isotopologues,
    })
}
