// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Per-Item Orchestrator.
//!
//! Drives one item from raw path to either an accepted output file or a
//! recorded [`ItemError`], sequencing every other module in this crate:
//! parse the path, resolve a bibcode, pick a workspace, unpack, find and
//! compile a main-file candidate (retrying with the next-ranked candidate
//! on a [`crate::compile::CompileFailure::General`]), fall back to PDF
//! harvesting when TeX compilation is not an option, and finally accept or
//! reject the extracted references against the minimum-reference
//! threshold.

use std::fs;
use std::path::{Path, PathBuf};
use tectonic_status_base::{tt_note, tt_warning, StatusBackend};

use crate::archive;
use crate::cleaner::clean_reference;
use crate::collaborators::Collaborators;
use crate::compile::{compile_and_extract_text, CompileFailure};
use crate::config::Config;
use crate::error::{ErrorKind, ItemError};
use crate::mainfile;
use crate::model::{ExtractionOutcome, Job, MarkerStyle, Reference, SourceFormat};
use crate::output::write_output;
use crate::subprocess::SubprocessRunner;
use crate::tagger;
use crate::textparse::{parse_dvi_markers, parse_pdf_markers};
use crate::model::Toolchain;
use crate::toolchain::EnvFrame;
use crate::workspace::Workspace;

/// The services and configuration a single item's processing needs,
/// threaded through instead of read from globals so that tests can swap in
/// a fake [`Collaborators`] and a scratch config.
pub struct ExtractionContext<'a, C: Collaborators> {
    pub config: &'a Config,
    pub collaborators: &'a C,
    pub runner: SubprocessRunner,
}

impl<'a, C: Collaborators> ExtractionContext<'a, C> {
    pub fn new(config: &'a Config, collaborators: &'a C) -> Self {
        ExtractionContext {
            config,
            collaborators,
            runner: SubprocessRunner::new(),
        }
    }
}

/// Process one batch line end to end. Returns the outcome on success and an
/// [`ItemError`] on any closed failure kind; the batch driver is
/// responsible for turning the latter into a log line and moving on.
#[derive(Debug)]
pub struct ItemResult {
    pub outcome: ExtractionOutcome,
    pub out_path: PathBuf,
}

pub fn process_item<C: Collaborators>(
    raw_path: &str,
    cx: &ExtractionContext<C>,
    status: &mut dyn StatusBackend,
) -> std::result::Result<ItemResult, ItemError> {
    let item = cx
        .collaborators
        .parse_arxiv_path(raw_path)
        .map_err(|e| ItemError::new(ErrorKind::InputMalformed, e.to_string()))?;

    let input_file = cx.config.pbase.join(&item.canonical_relpath);
    if !input_file.exists() {
        return Err(ItemError::new(
            ErrorKind::SourceMissing,
            format!("no source file at `{}`", input_file.display()),
        ));
    }

    let format = SourceFormat::classify(&item.suffix).ok_or_else(|| {
        ItemError::new(
            ErrorKind::UnknownFormat,
            format!("unrecognized archive suffix `{}`", item.suffix),
        )
    })?;

    let out_path = out_path_for(&cx.config.tbase, &item.canonical_relpath);
    if !cx.config.force && is_fresh(&out_path, &input_file) {
        tt_note!(status, "output is newer than source, skipping");
        return Ok(ItemResult {
            outcome: ExtractionOutcome::Skipped,
            out_path,
        });
    }

    let (bibcode, accno) = match cx.collaborators.lookup_bibcode(&item) {
        Ok(Some(pair)) => pair,
        Ok(None) => (cx.collaborators.partial_bibcode(&item), None),
        Err(e) => {
            return Err(ItemError::new(ErrorKind::BibcodeUnresolved, e.to_string()));
        }
    };

    let subdate = item.year * 10_000 + item.month * 100 + 1;
    let job = Job {
        item: item.clone(),
        bibcode,
        accno,
        subdate,
    };

    if cx.config.skip_refs {
        tt_note!(status, "skip-refs requested, not extracting");
        return Ok(ItemResult {
            outcome: ExtractionOutcome::Skipped,
            out_path,
        });
    }

    let refs = match format {
        SourceFormat::Tex => extract_from_tex(&job, &input_file, cx, status)?,
        SourceFormat::Pdf => extract_from_pdf(&job, &input_file, cx, status)?,
    };

    let outcome = ExtractionOutcome::from_refs(refs, cx.config.min_references());
    match &outcome {
        ExtractionOutcome::Ok(refs) => {
            write_output(&out_path, &job.bibcode, refs)
                .map_err(|e| ItemError::new(ErrorKind::OutputIoError, e.to_string()))?;
            tt_note!(status, "accepted {} references", refs.len());
        }
        ExtractionOutcome::TooFew(n) => {
            tt_warning!(status, "{}", ItemError::too_few(*n));
        }
        ExtractionOutcome::Empty => {
            tt_warning!(
                status,
                "{}",
                ItemError::new(ErrorKind::NoReferencesFound, "no references found")
            );
        }
        ExtractionOutcome::Failed(_) | ExtractionOutcome::Skipped => {}
    }

    Ok(ItemResult { outcome, out_path })
}

pub(crate) fn out_path_for(tbase: &Path, canonical_relpath: &str) -> PathBuf {
    let stem = Path::new(canonical_relpath)
        .with_extension("")
        .to_string_lossy()
        .into_owned();
    tbase.join(format!("{stem}.raw"))
}

fn is_fresh(out_path: &Path, input_file: &Path) -> bool {
    let (Ok(out_meta), Ok(in_meta)) = (fs::metadata(out_path), fs::metadata(input_file)) else {
        return false;
    };
    let (Ok(out_time), Ok(in_time)) = (out_meta.modified(), in_meta.modified()) else {
        return false;
    };
    out_time >= in_time
}

/// The TeX path: unpack, find main-file candidates, try each in ranked
/// order via the `pdftex`/`pdflatex` device route (retrying once with
/// PostScript-to-PDF graphics conversion if the first attempt fails before
/// giving up on that candidate), and fall back to the PDF-extraction
/// backend and harvester if every candidate fails and `try_pdf`/
/// `try_harvest` are enabled.
fn extract_from_tex<C: Collaborators>(
    job: &Job,
    input_file: &Path,
    cx: &ExtractionContext<C>,
    status: &mut dyn StatusBackend,
) -> std::result::Result<Vec<Reference>, ItemError> {
    let cfg = cx.config;
    let toolchain = Toolchain::for_subdate(job.subdate, &cfg.texbase);

    let ws = Workspace::acquire(&cfg.scratch_root, cfg.debug)
        .map_err(|e| ItemError::new(ErrorKind::UnpackFailed, e.to_string()))?;
    archive::unpack(&ws, input_file, &cx.runner)
        .map_err(|e| ItemError::new(ErrorKind::UnpackFailed, e.to_string()))?;
    let root_dir = ws.root_dir().to_path_buf();

    let candidates = mainfile::find_main(&root_dir)
        .map_err(|e| ItemError::new(ErrorKind::NoMainFile, e.to_string()))?;
    let candidates: Vec<_> = candidates.into_iter().filter(|c| !c.ignore).collect();

    if candidates.is_empty() {
        return Err(ItemError::new(
            ErrorKind::NoMainFile,
            "no plausible main TeX file was found".to_string(),
        ));
    }

    let _env_frame = EnvFrame::apply(&toolchain);
    let marker_style = MarkerStyle::Pdf;

    let mut last_failure: Option<ItemError> = None;
    for candidate in &candidates {
        let main_path = root_dir.join(&candidate.file);
        let tagged = tagger::tag_refs(
            &main_path,
            candidate.bibitem_macro.as_deref(),
            marker_style,
            false,
            &cx.runner,
        );
        if let Err(e) = tagged {
            last_failure = Some(ItemError::new(ErrorKind::NoMainFile, e.to_string()));
            continue;
        }

        let mut text = compile_and_extract_text(&ws, candidate, marker_style, &cx.runner);
        if matches!(text, Err(CompileFailure::General(_))) && marker_style == MarkerStyle::Pdf {
            // `pdftex`/`pdflatex` cannot embed `.eps` graphics; if the first
            // attempt failed, remap them to `.pdf` and retry once before
            // giving up on this candidate.
            if tagger::convert_graphics(&root_dir, &cx.runner).is_ok() {
                text = compile_and_extract_text(&ws, candidate, marker_style, &cx.runner);
            }
        }

        match text {
            Ok(text) => {
                let refs = match marker_style {
                    MarkerStyle::Pdf => {
                        parse_pdf_markers(&text, cx.collaborators.arxiv_categories())
                    }
                    MarkerStyle::Dvi => parse_dvi_markers(&text, candidate.title.as_deref()),
                };
                if !refs.is_empty() {
                    return Ok(refs);
                }
                tt_warning!(status, "candidate `{}` compiled but yielded no references", candidate.basename);
            }
            Err(CompileFailure::General(msg)) => {
                tt_warning!(status, "candidate `{}` failed: {}", candidate.basename, msg);
                last_failure = Some(ItemError::new(ErrorKind::CompileOutputMissing, msg));
                continue;
            }
            Err(CompileFailure::Specific(e)) => {
                return Err(e);
            }
        }
    }

    if cfg.try_pdf && cfg.try_harvest {
        if let Ok(refs) = harvest_pdf_fallback(job, cx, status) {
            if !refs.is_empty() {
                return Ok(refs);
            }
        }
    }

    Err(last_failure.unwrap_or_else(|| {
        ItemError::new(
            ErrorKind::TextConversionFailed,
            "every main-file candidate failed to compile".to_string(),
        )
    }))
}

fn extract_from_pdf<C: Collaborators>(
    _job: &Job,
    input_file: &Path,
    cx: &ExtractionContext<C>,
    _status: &mut dyn StatusBackend,
) -> std::result::Result<Vec<Reference>, ItemError> {
    let refs = cx
        .collaborators
        .extract_pdf_references(input_file)
        .map_err(|e| ItemError::new(ErrorKind::TextConversionFailed, e.to_string()))?;
    Ok(refs
        .into_iter()
        .map(|r| clean_reference(&r, None))
        .collect())
}

fn harvest_pdf_fallback<C: Collaborators>(
    job: &Job,
    cx: &ExtractionContext<C>,
    status: &mut dyn StatusBackend,
) -> std::result::Result<Vec<Reference>, ItemError> {
    let pdf_path = cx.config.pbase.join(format!("{}.harvested.pdf", job.item.eprint_id));
    cx.collaborators
        .harvest_pdf(&job.item, &pdf_path)
        .map_err(|e| ItemError::new(ErrorKind::WithdrawnItem, e.to_string()))?;
    tt_note!(status, "falling back to a harvested PDF rendering");
    cx.collaborators
        .extract_pdf_references(&pdf_path)
        .map_err(|e| ItemError::new(ErrorKind::TextConversionFailed, e.to_string()))
        .map(|refs| refs.into_iter().map(|r| clean_reference(&r, None)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArxivItem;
    use std::collections::HashSet;
    use std::sync::OnceLock;
    use std::time::Duration;

    struct FakeCollaborators {
        categories: HashSet<String>,
        pdf_refs: Option<Vec<Reference>>,
    }

    impl FakeCollaborators {
        fn new() -> Self {
            FakeCollaborators {
                categories: ["astro-ph".to_string()].into_iter().collect(),
                pdf_refs: None,
            }
        }

        fn with_pdf_refs(refs: Vec<Reference>) -> Self {
            FakeCollaborators {
                pdf_refs: Some(refs),
                ..FakeCollaborators::new()
            }
        }
    }

    impl Collaborators for FakeCollaborators {
        fn parse_arxiv_path(&self, raw_path: &str) -> tectonic_errors::Result<ArxivItem> {
            if raw_path == "garbage-not-an-eprint" {
                tectonic_errors::prelude::bail!("cannot parse eprint");
            }
            let suffix = if raw_path.ends_with(".pdf") {
                "pdf"
            } else {
                "tex"
            };
            Ok(ArxivItem {
                raw_path: raw_path.to_string(),
                eprint_id: "0704.0001".to_string(),
                category: "astro-ph".to_string(),
                year: 2007,
                month: 4,
                suffix: suffix.to_string(),
                canonical_relpath: raw_path.to_string(),
            })
        }

        fn partial_bibcode(&self, _item: &ArxivItem) -> String {
            "2007arXiv070400019Z".to_string()
        }

        fn lookup_bibcode(
            &self,
            _item: &ArxivItem,
        ) -> tectonic_errors::Result<Option<(String, Option<String>)>> {
            Ok(None)
        }

        fn harvest_pdf(&self, _item: &ArxivItem, _dest: &Path) -> tectonic_errors::Result<()> {
            tectonic_errors::prelude::bail!("no harvester in tests")
        }

        fn extract_pdf_references(
            &self,
            _pdf_path: &Path,
        ) -> tectonic_errors::Result<Vec<Reference>> {
            match &self.pdf_refs {
                Some(refs) => Ok(refs.clone()),
                None => tectonic_errors::prelude::bail!("no pdf extractor in tests"),
            }
        }

        fn arxiv_categories(&self) -> &HashSet<String> {
            &self.categories
        }
    }

    fn test_config(scratch: &Path, pbase: &Path, tbase: &Path) -> Config {
        Config {
            scratch_root: scratch.to_path_buf(),
            pbase: pbase.to_path_buf(),
            tbase: tbase.to_path_buf(),
            texbase: PathBuf::from("/nonexistent-texbase"),
            force: false,
            try_pdf: true,
            try_harvest: true,
            skip_refs: false,
            debug: 0,
        }
    }

    struct NullStatus;
    impl StatusBackend for NullStatus {
        fn report(
            &mut self,
            _kind: tectonic_status_base::MessageKind,
            _args: std::fmt::Arguments<'_>,
            _err: Option<&tectonic_errors::Error>,
        ) {
        }
        fn dump_error_logs(&mut self, _output: &[u8]) {}
    }

    #[test]
    fn source_missing_is_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();
        let cfg = test_config(scratch.path(), pbase.path(), tbase.path());
        let collab = FakeCollaborators::new();
        let cx = ExtractionContext::new(&cfg, &collab);
        let mut status = NullStatus;

        let err = process_item("nope/does-not-exist.tar.gz", &cx, &mut status).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceMissing);
    }

    #[test]
    fn fresh_output_is_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();

        let input = pbase.path().join("item.tar.gz");
        fs::write(&input, b"dummy").unwrap();

        let out_path = out_path_for(tbase.path(), "item.tar.gz");
        fs::create_dir_all(out_path.parent().unwrap()).unwrap();
        fs::write(&out_path, b"%R bib\n%Z\n").unwrap();

        // Ensure the output's mtime is not older than the input's.
        let now = filetime_now();
        filetime_set(&out_path, now);
        filetime_set(&input, now - Duration::from_secs(3600));

        let cfg = test_config(scratch.path(), pbase.path(), tbase.path());
        let collab = FakeCollaborators::new();
        let cx = ExtractionContext::new(&cfg, &collab);
        let mut status = NullStatus;

        let result = process_item("item.tar.gz", &cx, &mut status).unwrap();
        assert!(matches!(result.outcome, ExtractionOutcome::Skipped));
    }

    #[test]
    fn skip_refs_short_circuits() {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();
        fs::write(pbase.path().join("item.tar.gz"), b"dummy").unwrap();

        let mut cfg = test_config(scratch.path(), pbase.path(), tbase.path());
        cfg.skip_refs = true;
        let collab = FakeCollaborators::new();
        let cx = ExtractionContext::new(&cfg, &collab);
        let mut status = NullStatus;

        let result = process_item("item.tar.gz", &cx, &mut status).unwrap();
        assert!(matches!(result.outcome, ExtractionOutcome::Skipped));
    }

    #[test]
    fn unparseable_path_is_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();
        let cfg = test_config(scratch.path(), pbase.path(), tbase.path());
        let collab = FakeCollaborators::new();
        let cx = ExtractionContext::new(&cfg, &collab);
        let mut status = NullStatus;

        let err = process_item("garbage-not-an-eprint", &cx, &mut status).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InputMalformed);
    }

    #[test]
    fn pdf_item_is_accepted_without_a_subprocess() {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();
        fs::write(pbase.path().join("item.pdf"), b"dummy").unwrap();

        let refs: Vec<Reference> = (0..17).map(|i| format!("ref {i}")).collect();
        let cfg = test_config(scratch.path(), pbase.path(), tbase.path());
        let collab = FakeCollaborators::with_pdf_refs(refs);
        let cx = ExtractionContext::new(&cfg, &collab);
        let mut status = NullStatus;

        let result = process_item("item.pdf", &cx, &mut status).unwrap();
        assert!(matches!(result.outcome, ExtractionOutcome::Ok(ref r) if r.len() == 17));
        let written = fs::read_to_string(&result.out_path).unwrap();
        assert_eq!(written.lines().count(), 19); // %R, %Z, 17 references
    }

    #[test]
    fn too_few_references_leaves_no_output_file() {
        let scratch = tempfile::tempdir().unwrap();
        let pbase = tempfile::tempdir().unwrap();
        let tbase = tempfile::tempdir().unwrap();
        fs::write(pbase.path().join("item.pdf"), b"dummy").unwrap();

        let refs: Vec<Reference> = vec!["only one".to_string()];
        let cfg = test_config(scratch.path(), pbase.path(), tbase.path());
        let collab = FakeCollaborators::with_pdf_refs(refs);
        let cx = ExtractionContext::new(&cfg, &collab);
        let mut status = NullStatus;

        let result = process_item("item.pdf", &cx, &mut status).unwrap();
        assert!(matches!(result.outcome, ExtractionOutcome::TooFew(1)));
        assert!(!result.out_path.exists());
    }

    fn filetime_now() -> Duration {
        static EPOCH: OnceLock<Duration> = OnceLock::new();
        *EPOCH.get_or_init(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
        })
    }

    fn filetime_set(path: &Path, since_epoch: Duration) {
        let t = std::time::UNIX_EPOCH + since_epoch;
        let f = fs::File::options().write(true).open(path).unwrap();
        f.set_modified(t).unwrap();
    }
}
