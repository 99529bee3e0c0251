use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "mimi",
    version,
    about = "Molecular Isotope Mass Identifier",
    long_about = "Identify candidate chemical compounds behind mass spectrometry peaks \
                  by matching precomputed isotopologue patterns against sample spectra."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Precompute compound isotopologue patterns into a binary cache
    CacheCreate(commands::cache_create::CacheCreateArgs),
    /// Match cached compounds against sample spectra and write a report
    Analyze(commands::analyze::AnalyzeArgs),
    /// Inspect the contents of a cache file
    CacheDump(commands::cache_dump::CacheDumpArgs),
    /// Convert an HMDB metabolites XML export into a compound database TSV
    Hmdb(commands::hmdb::HmdbArgs),
    /// Build a compound database TSV from the KEGG REST API
    Kegg(commands::kegg::KeggArgs),
}

fn main() {
    let cli = Cli::parse();
    let full_command = std::env::args().collect::<Vec<_>>().join(" ");
    let result = match cli.command {
        Command::CacheCreate(args) => commands::cache_create::run(&args, &full_command),
        Command::Analyze(args) => commands::analyze::run(&args, &full_command),
        Command::CacheDump(args) => commands::cache_dump::run(&args),
        Command::Hmdb(args) => commands::hmdb::run(&args),
        Command::Kegg(args) => commands::kegg::run(&args),
    };
    if let Err(err) = result {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
