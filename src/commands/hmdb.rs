use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use flate2::read::GzDecoder;

use mimi::{monoisotopic_mass, parse_formula, IonMode, IsotopeTable, MimiError, Result};

#[derive(Args, Debug)]
pub struct HmdbArgs {
    /// HMDB metabolites XML export (optionally gzip-compressed)
    pub xml_file: PathBuf,

    /// Output compound database TSV
    #[arg(short = 'o', long = "output", value_name = "TSV")]
    pub output: PathBuf,

    /// Keep only compounds at or above this neutral monoisotopic mass
    #[arg(long = "min-mass", value_name = "DA")]
    pub min_mass: Option<f64>,

    /// Keep only compounds at or below this neutral monoisotopic mass
    #[arg(long = "max-mass", value_name = "DA")]
    pub max_mass: Option<f64>,
}

pub fn run(args: &HmdbArgs) -> Result<()> {
    let table = IsotopeTable::natural()?;
    let text = read_xml(&args.xml_file)?;
    let document = roxmltree::Document::parse(&text).map_err(|e| MimiError::MalformedInput {
        path: args.xml_file.display().to_string(),
        message: e.to_string(),
    })?;

    let mut rows: Vec<(String, String, String)> = Vec::new();
    let mut skipped = 0usize;
    for metabolite in document
        .descendants()
        .filter(|node| node.tag_name().name() == "metabolite")
    {
        let Some(id) = child_text(&metabolite, "accession") else {
            continue;
        };
        let Some(name) = child_text(&metabolite, "name") else {
            continue;
        };
        let Some(formula) = child_text(&metabolite, "chemical_formula") else {
            continue;
        };
        match parse_formula(&formula, &table) {
            Ok(parsed) => {
                let mass = monoisotopic_mass(&parsed, IonMode::Neutral);
                if args.min_mass.is_some_and(|lo| mass < lo)
                    || args.max_mass.is_some_and(|hi| mass > hi)
                {
                    continue;
                }
                rows.push((formula, id, name));
            }
            Err(_) => skipped += 1,
        }
    }

    let file = File::create(&args.output)
        .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;
    let mut out = BufWriter::new(file);
    (|| -> std::io::Result<()> {
        writeln!(out, "CF\tID\tName")?;
        for (formula, id, name) in &rows {
            writeln!(out, "{formula}\t{id}\t{name}")?;
        }
        out.flush()
    })()
    .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;

    println!(
        "Wrote {} compounds to {} ({} unparseable formulas skipped)",
        rows.len(),
        args.output.display(),
        skipped
    );
    Ok(())
}

/// Text of the first direct child with the given local tag name. Direct
/// children only: an HMDB `<secondary_accessions>` block nests `accession`
/// elements that must not shadow the primary one.
fn child_text(node: &roxmltree::Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.tag_name().name() == tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn read_xml(path: &Path) -> Result<String> {
    if path.extension().is_some_and(|ext| ext == "gz") {
        let file = File::open(path).map_err(|e| MimiError::io(path.display().to_string(), e))?;
        let mut text = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut text)
            .map_err(|e| MimiError::io(path.display().to_string(), e))?;
        Ok(text)
    } else {
        fs::read_to_string(path).map_err(|e| MimiError::io(path.display().to_string(), e))
    }
}
