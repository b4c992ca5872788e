// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! `refextract`: recover bibliographic references from ArXiv preprint
//! source archives.

mod archive;
mod batch;
mod cleaner;
mod collaborators;
mod compile;
mod config;
mod error;
mod mainfile;
mod model;
mod orchestrator;
mod output;
mod status;
mod subprocess;
mod tagger;
mod textparse;
mod toolchain;
mod workspace;

use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use collaborators::ReferenceCollaborators;
use config::Config;
use orchestrator::ExtractionContext;

/// Recover bibliographic references from ArXiv preprint source archives.
///
/// Reads one raw ArXiv path per line from stdin and writes `path\tout_path`
/// to stdout for every item whose extraction was accepted.
#[derive(Parser, Debug)]
#[command(name = "refextract", version, about)]
struct Cli {
    /// Fulltext base directory: where source archives and harvested PDFs
    /// live, keyed by canonical relative path.
    #[arg(long)]
    pbase: Option<PathBuf>,

    /// Output base directory: where accepted `.raw` reference files land.
    #[arg(long)]
    tbase: Option<PathBuf>,

    /// TeX toolchain root: parent of the era-specific toolchain trees.
    #[arg(long)]
    texbase: Option<PathBuf>,

    /// Reprocess items even if their output is already newer than their
    /// source.
    #[arg(long)]
    force: bool,

    /// Never fall back to the external PDF-extraction backend after every
    /// TeX main-file candidate fails to compile.
    #[arg(long = "no-pdf")]
    no_pdf: bool,

    /// Never harvest a PDF rendering when TeX compilation fails.
    #[arg(long = "no-harvest")]
    no_harvest: bool,

    /// Skip reference extraction entirely; useful for dry-run validation of
    /// the input list.
    #[arg(long)]
    skip_refs: bool,

    /// Increase diagnostic verbosity. Pass twice to retain scratch
    /// workspaces on disk after processing.
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(p) = cli.pbase {
        config.pbase = p;
    }
    if let Some(t) = cli.tbase {
        config.tbase = t;
    }
    if let Some(t) = cli.texbase {
        config.texbase = t;
    }
    config.force = cli.force;
    config.try_pdf = !cli.no_pdf;
    config.try_harvest = !cli.no_harvest;
    config.skip_refs = cli.skip_refs;
    config.debug = cli.debug;

    let collaborators = ReferenceCollaborators::new();
    let cx = ExtractionContext::new(&config, &collaborators);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let stats = batch::run_batch(stdin.lock(), stdout.lock(), &cx);

    eprintln!(
        "refextract: {} attempted, {} accepted, {} failed",
        stats.attempted, stats.accepted, stats.failed
    );

    ExitCode::SUCCESS
}
