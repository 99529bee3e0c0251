use std::fs;
use std::path::PathBuf;

use chrono::Local;
use clap::Args;

use mimi::{Analyzer, CompoundDatabase, IsotopeTable, MimiError, Result, RunLog, Spectrum};

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Tolerance in ppm for the monoisotopic mass match
    #[arg(short = 'p', long = "ppm")]
    pub ppm: f64,

    /// Tolerance in ppm for isotope pattern verification
    #[arg(short = 'v', long = "vp", visible_alias = "vppm")]
    pub vppm: f64,

    /// Cache file(s) produced by cache-create
    #[arg(short = 'c', long = "cache", value_name = "DBBINARY", num_args = 1.., required = true)]
    pub caches: Vec<PathBuf>,

    /// Sample spectrum file(s)
    #[arg(short = 's', long = "sample", value_name = "SAMPLE", num_args = 1.., required = true)]
    pub samples: Vec<PathBuf>,

    /// Output report file
    #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Write per-hit validation arithmetic to the debug file
    #[arg(short = 'g', long = "debug", hide = true)]
    pub debug: bool,
}

pub fn run(args: &AnalyzeArgs, full_command: &str) -> Result<()> {
    let mut log = RunLog::create(&args.output, args.debug)?;
    let table = IsotopeTable::natural()?;

    let mut databases = Vec::new();
    for path in &args.caches {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        databases.push((name, CompoundDatabase::read(path)?));
    }

    let mut samples = Vec::new();
    for path in &args.samples {
        let spectrum = Spectrum::load(path)?;
        if spectrum.skipped_rows > 0 {
            log.warn(&format!(
                "{}: skipped {} unparseable row(s)",
                path.display(),
                spectrum.skipped_rows
            ));
        }
        samples.push(spectrum);
    }

    log.write("MIMI Mass Analysis Run Information:");
    log.write(&"=".repeat(80));
    log.write(&format!("Full Command: {full_command}"));
    log.write(&format!(
        "Date: {}",
        Local::now().format("%Y-%m-%dT%H:%M:%S")
    ));
    log.write(&format!("MIMI Version: {}", env!("CARGO_PKG_VERSION")));
    log.write(&format!("PPM Tolerance: {}", args.ppm));
    log.write(&format!("Verification PPM: {}", args.vppm));
    log.write(&"-".repeat(80));

    log.write("\nCache Information:");
    log.write(&"=".repeat(80));
    for (idx, (_, database)) in databases.iter().enumerate() {
        let metadata = &database.metadata;
        log.write(&format!("Cache {}: {}", idx + 1, args.caches[idx].display()));
        log.write(&format!("Full Command: {}", metadata.full_command));
        log.write(&format!("Creation Date: {}", metadata.creation_date));
        log.write(&format!("MIMI Version: {}", metadata.version));
        log.write(&format!("Compounds: {}", database.compounds.len()));
        log.write(&format!("Ionization Mode: {}", metadata.ionization_mode));
        log.write(&format!(
            "Labeled Atoms File: {}",
            metadata.labeled_atoms_file.as_deref().unwrap_or("None")
        ));
        log.write(&format!(
            "Compound DB Files: {}",
            metadata.compound_db_files.join(" ")
        ));
        log.write(&"-".repeat(80));
    }

    log.write("\nSample Information:");
    log.write(&"=".repeat(80));
    for (idx, spectrum) in samples.iter().enumerate() {
        log.write(&format!("\nSample {}: {}", idx + 1, spectrum.path));
        log.write(&format!("Data points: {}", spectrum.len()));
        log.write(&"-".repeat(80));
    }
    log.write("\n");

    let mut analyzer = Analyzer::new(&table, &databases, &samples, args.ppm / 1e6, args.vppm / 1e6);
    analyzer.run(&mut log);

    log.write("Writing results to output file...");
    let report = analyzer.report(&log.log_path.display().to_string());
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| MimiError::io(parent.display().to_string(), e))?;
        }
    }
    fs::write(&args.output, report)
        .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;

    if analyzer.cf_conflicts() > 0 {
        eprintln!(
            "WARNING: {} CF_CONFLICT(s) were detected during analysis; see {}",
            analyzer.cf_conflicts(),
            log.log_path.display()
        );
    }
    if log.warnings() > 0 {
        eprintln!(
            "{} recoverable problem(s) were logged to {}",
            log.warnings(),
            log.log_path.display()
        );
    }
    Ok(())
}
