use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Args;

use mimi::{CompoundDatabase, MimiError, ParsedFormula, Result};

#[derive(Args, Debug)]
pub struct CacheDumpArgs {
    /// Input cache file
    pub cache_file: PathBuf,

    /// Number of compounds to output (default: all)
    #[arg(short = 'n', long = "num-compounds")]
    pub num_compounds: Option<usize>,

    /// Number of isotope variants per compound to output (default: all)
    #[arg(short = 'i', long = "num-isotopes")]
    pub num_isotopes: Option<usize>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn run(args: &CacheDumpArgs) -> Result<()> {
    let database = CompoundDatabase::read(&args.cache_file)?;
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| MimiError::io(path.display().to_string(), e))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    dump(&mut out, &database, args.num_compounds, args.num_isotopes)
        .map_err(|e| MimiError::io("writing cache dump", e))
}

fn dump(
    out: &mut dyn Write,
    database: &CompoundDatabase,
    num_compounds: Option<usize>,
    num_isotopes: Option<usize>,
) -> io::Result<()> {
    let metadata = &database.metadata;
    writeln!(out, "# Cache Metadata:")?;
    writeln!(out, "# Creation Date: {}", metadata.creation_date)?;
    writeln!(out, "# MIMI Version: {}", metadata.version)?;
    writeln!(out)?;
    writeln!(out, "# Creation Parameters:")?;
    writeln!(out, "# Full Command: {}", metadata.full_command)?;
    writeln!(out, "# Ionization Mode: {}", metadata.ionization_mode)?;
    writeln!(
        out,
        "# Labeled Atoms File: {}",
        metadata.labeled_atoms_file.as_deref().unwrap_or("None")
    )?;
    writeln!(
        out,
        "# Compound DB Files: {}",
        metadata.compound_db_files.join(", ")
    )?;
    writeln!(out, "# Cache Output File: {}", metadata.cache_output_file)?;
    writeln!(out, "# Isotope Data File: {}", metadata.isotope_data_file)?;
    writeln!(out, "# Noise Cutoff: {}", metadata.noise_cutoff)?;
    writeln!(out)?;

    let count = num_compounds.unwrap_or(database.compounds.len());
    for (id, compound) in database.compounds.iter().take(count) {
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out, "Compound ID:      {id}")?;
        writeln!(out, "Name:             {}", compound.name)?;
        writeln!(out, "Formula:          {}", annotated_formula(&compound.parsed))?;
        writeln!(out, "Mono-isotopic:    Yes (most abundant isotope)")?;
        writeln!(out, "Mass:             {:.6}", compound.mass)?;
        writeln!(out, "Relative Abund:   1.000000 (reference)")?;
        writeln!(out, "{}", "-".repeat(60))?;

        let variants = compound.isotopologues.get(1..).unwrap_or(&[]);
        let variants = &variants[..num_isotopes.unwrap_or(variants.len()).min(variants.len())];
        if !variants.is_empty() {
            writeln!(out, "ISOTOPE VARIANTS:")?;
        }
        for (i, variant) in variants.iter().enumerate() {
            writeln!(out, "  Variant #{}:", i + 1)?;
            writeln!(out, "  Formula:        {}", variant.label)?;
            writeln!(out, "  Mono-isotopic:  No (isotope variant)")?;
            writeln!(out, "  Mass:           {:.6}", variant.mass)?;
            writeln!(out, "  Relative Abund: {:.6} (expected)", variant.abundance)?;
            writeln!(out, "{}", "-".repeat(60))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Annotate each element of a formula with its reference isotope's nominal
/// mass, e.g. `C6H12O6` becomes `[12]C6[1]H12[16]O6`.
fn annotated_formula(parsed: &ParsedFormula) -> String {
    let mut out = String::new();
    for term in parsed.terms() {
        out.push_str(&format!(
            "[{}]{}",
            term.element.most_abundant().nominal_mass,
            term.element.symbol
        ));
        if term.count > 1 {
            out.push_str(&term.count.to_string());
        }
    }
    out
}
