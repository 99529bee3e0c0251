use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::Args;
use itertools::Itertools;

use mimi::{MimiError, Result};

const KEGG_BASE: &str = "https://rest.kegg.jp";
const MAX_RETRIES: usize = 5;
/// Width of one exact-mass discovery request, in Daltons.
const MASS_CHUNK: f64 = 10.0;

#[derive(Args, Debug)]
pub struct KeggArgs {
    /// Lower bound of the exact-mass discovery range
    #[arg(long = "min-mass", value_name = "DA", required_unless_present = "compound_ids")]
    pub min_mass: Option<f64>,

    /// Upper bound of the exact-mass discovery range
    #[arg(long = "max-mass", value_name = "DA", required_unless_present = "compound_ids")]
    pub max_mass: Option<f64>,

    /// TSV with an ID column of KEGG compound ids, used instead of a mass range
    #[arg(long = "compound-ids", value_name = "TSV")]
    pub compound_ids: Option<PathBuf>,

    /// Compounds fetched per request
    #[arg(short = 'b', long = "batch-size", default_value_t = 5)]
    pub batch_size: usize,

    /// Output compound database TSV
    #[arg(short = 'o', long = "output", value_name = "TSV")]
    pub output: PathBuf,
}

pub fn run(args: &KeggArgs) -> Result<()> {
    let client = reqwest::blocking::Client::new();
    let ids = match &args.compound_ids {
        Some(path) => load_id_column(path)?,
        None => {
            let (Some(lo), Some(hi)) = (args.min_mass, args.max_mass) else {
                return Err(MimiError::MalformedInput {
                    path: "arguments".to_string(),
                    message: "--min-mass and --max-mass are required without --compound-ids"
                        .to_string(),
                });
            };
            discover_by_mass(&client, lo, hi)?
        }
    };

    let file = File::create(&args.output)
        .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "CF\tID\tName")
        .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;

    let batch_size = args.batch_size.max(1);
    let mut written = 0usize;
    for batch in ids.chunks(batch_size) {
        let url = format!(
            "{KEGG_BASE}/get/{}",
            batch.iter().map(|id| format!("cpd:{id}")).join("+")
        );
        let text = fetch_with_retry(&client, &url)?;
        for (id, name, formula) in parse_flat_file(&text) {
            writeln!(out, "{formula}\t{id}\t{name}")
                .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;
            written += 1;
        }
    }
    out.flush()
        .map_err(|e| MimiError::io(args.output.display().to_string(), e))?;

    println!(
        "Wrote {} of {} compounds to {}",
        written,
        ids.len(),
        args.output.display()
    );
    Ok(())
}

/// Discover compound ids over `[lo, hi]` Da through the exact-mass search
/// endpoint, one chunk at a time.
fn discover_by_mass(client: &reqwest::blocking::Client, lo: f64, hi: f64) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut current = lo;
    while current < hi {
        let upper = (current + MASS_CHUNK).min(hi);
        let url = format!("{KEGG_BASE}/find/compound/{current}-{upper}/exact_mass");
        let text = fetch_with_retry(client, &url)?;
        for line in text.lines() {
            let Some(raw_id) = line.split('\t').next() else {
                continue;
            };
            let id = raw_id.trim().trim_start_matches("cpd:");
            if !id.is_empty() && seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
        current = upper;
    }
    Ok(ids)
}

/// Parse KEGG flat-file records into `(id, name, formula)` triples.
/// Records are separated by `///`; only entries carrying a FORMULA line
/// are kept, and only the first NAME (trailing `;` stripped) is used.
fn parse_flat_file(text: &str) -> Vec<(String, String, String)> {
    let mut compounds = Vec::new();
    for record in text.split("///") {
        let mut id = None;
        let mut name = None;
        let mut formula = None;
        for line in record.lines() {
            if let Some(rest) = line.strip_prefix("ENTRY") {
                id = rest.split_whitespace().next().map(str::to_string);
            } else if let Some(rest) = line.strip_prefix("NAME") {
                if name.is_none() {
                    let first = rest.trim().trim_end_matches(';');
                    if !first.is_empty() {
                        name = Some(first.to_string());
                    }
                }
            } else if let Some(rest) = line.strip_prefix("FORMULA") {
                formula = rest.split_whitespace().next().map(str::to_string);
            }
        }
        if let (Some(id), Some(formula)) = (id, formula) {
            compounds.push((id, name.unwrap_or_default(), formula));
        }
    }
    compounds
}

fn fetch_with_retry(client: &reqwest::blocking::Client, url: &str) -> Result<String> {
    let mut delay = 2u64;
    let mut last_error = None;
    for attempt in 0..MAX_RETRIES {
        match client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
        {
            Ok(text) => return Ok(text),
            Err(err) => {
                if attempt + 1 < MAX_RETRIES {
                    eprintln!(
                        "Request failed ({err}); retrying in {delay}s (attempt {}/{MAX_RETRIES})",
                        attempt + 2
                    );
                    thread::sleep(Duration::from_secs(delay));
                    delay *= 2;
                }
                last_error = Some(err);
            }
        }
    }
    Err(MimiError::io(
        url.to_string(),
        std::io::Error::other(
            last_error.map_or_else(|| "request failed".to_string(), |e| e.to_string()),
        ),
    ))
}

/// Read the `ID` column from a TSV file (header-discovered, default first
/// column). Comment lines start with `#`.
fn load_id_column(path: &Path) -> Result<Vec<String>> {
    let text =
        fs::read_to_string(path).map_err(|e| MimiError::io(path.display().to_string(), e))?;
    let mut ids = Vec::new();
    let mut id_idx = 0usize;
    let mut header_seen = false;
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if !header_seen {
            if let Some(i) = fields.iter().position(|f| *f == "ID") {
                id_idx = i;
            }
            header_seen = true;
            continue;
        }
        if let Some(id) = fields.get(id_idx) {
            if !id.is_empty() {
                ids.push((*id).to_string());
            }
        }
    }
    Ok(ids)
}
