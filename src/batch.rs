// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Batch Driver.
//!
//! Reads one ArXiv path per line from its input, drives each through the
//! orchestrator, writes `path\tout_path` to stdout for every accepted item,
//! and always exits successfully: a single item's failure is recorded and
//! logged, never allowed to abort the run.

use std::io::{BufRead, Write};

use serde::Serialize;
use tectonic_status_base::{tt_error, StatusBackend};

use crate::collaborators::Collaborators;
use crate::model::ExtractionOutcome;
use crate::orchestrator::{process_item, ExtractionContext};
use crate::status::ItemStatusBackend;

/// Tallies produced by one batch run, reported as a summary line on stderr
/// both in human-readable form and, for any downstream tooling that wants
/// to ingest a run's results, as one JSON record.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BatchStats {
    pub attempted: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub empty: usize,
    pub too_few: usize,
    pub failed: usize,
}

impl BatchStats {
    fn record(&mut self, outcome: &ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Ok(_) => self.accepted += 1,
            ExtractionOutcome::Skipped => self.skipped += 1,
            ExtractionOutcome::Empty => self.empty += 1,
            ExtractionOutcome::TooFew(_) => self.too_few += 1,
            ExtractionOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Run a full batch: `input` supplies one raw ArXiv path per line (blank
/// lines and lines starting with `#` are ignored), `output` receives
/// `path\tout_path` for every accepted item.
pub fn run_batch<R, W, C>(input: R, mut output: W, cx: &ExtractionContext<C>) -> BatchStats
where
    R: BufRead,
    W: Write,
    C: Collaborators,
{
    let mut stats = BatchStats::default();

    for line in input.lines() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        stats.attempted += 1;
        let mut status = ItemStatusBackend::new(trimmed);

        match process_item(trimmed, cx, &mut status) {
            Ok(result) => {
                stats.record(&result.outcome);
                if matches!(result.outcome, ExtractionOutcome::Ok(_)) {
                    let _ = writeln!(output, "{}\t{}", trimmed, result.out_path.display());
                }
            }
            Err(e) => {
                stats.failed += 1;
                tt_error!(status, "{}", e);
            }
        }
    }

    let mut summary_status = ItemStatusBackend::new("batch");
    tectonic_status_base::tt_note!(
        summary_status,
        "{} attempted, {} accepted, {} skipped, {} empty, {} too few, {} failed",
        stats.attempted,
        stats.accepted,
        stats.skipped,
        stats.empty,
        stats.too_few,
        stats.failed
    );

    if let Ok(record) = serde_json::to_string(&stats) {
        eprintln!("{record}");
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ReferenceCollaborators;
    use crate::config::Config;
    use std::io::Cursor;

    fn test_config() -> Config {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();
        Config {
            scratch_root: scratch.into_path(),
            pbase: pbase.into_path(),
            tbase: tbase.into_path(),
            texbase: std::path::PathBuf::from("/nonexistent"),
            force: false,
            try_pdf: true,
            try_harvest: true,
            skip_refs: false,
            debug: 0,
        }
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let cfg = test_config();
        let collab = ReferenceCollaborators::new();
        let cx = ExtractionContext::new(&cfg, &collab);

        let input = Cursor::new(b"\n# a comment\n   \n".to_vec());
        let mut out = Vec::new();
        let stats = run_batch(input, &mut out, &cx);

        assert_eq!(stats.attempted, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn missing_source_counts_as_failed() {
        let cfg = test_config();
        let collab = ReferenceCollaborators::new();
        let cx = ExtractionContext::new(&cfg, &collab);

        let input = Cursor::new(b"astro-ph/9901001.tar.gz\n".to_vec());
        let mut out = Vec::new();
        let stats = run_batch(input, &mut out, &cx);

        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.failed, 1);
        assert!(out.is_empty());
    }
}
