// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Compile-and-Extract stage.
//!
//! Runs the era-appropriate TeX engine over one main-file candidate, reads
//! the `.log` it produces to find where the device output landed, and
//! converts that DVI or PDF into plain text for the Text-Output Parsers to
//! comb through. Failures are split into [`CompileFailure::General`] (this
//! candidate just didn't pan out; the orchestrator should try the next one)
//! and [`CompileFailure::Specific`] (a definite, non-retryable problem),
//! so the orchestrator can decide whether a build failure should fail the
//! whole item or just get logged and the next candidate tried.

use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tectonic_errors::prelude::*;

use crate::error::{ErrorKind, ItemError};
use crate::model::{DocFormat, MainCandidate, MarkerStyle};
use crate::subprocess::{ExitStatusKind, StdioPlan, SubprocessRunner};
use crate::workspace::Workspace;

const COMPILE_TIMEOUT: Duration = Duration::from_secs(100);
const CONVERT_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a compile-and-extract attempt on one candidate did not produce text.
pub enum CompileFailure {
    /// This candidate did not work out; the orchestrator should try the
    /// next-ranked one, if any remain.
    General(String),
    /// A definite, non-retryable problem — trying another candidate would
    /// not help.
    Specific(ItemError),
}

impl From<tectonic_errors::Error> for CompileFailure {
    fn from(e: tectonic_errors::Error) -> Self {
        CompileFailure::Specific(ItemError::from(e))
    }
}

/// The external engine binary to invoke for a given source format and
/// marker style.
fn engine_for(format: DocFormat, marker_style: MarkerStyle) -> &'static str {
    match (format, marker_style) {
        (DocFormat::Tex, MarkerStyle::Dvi) => "tex",
        (DocFormat::Tex, MarkerStyle::Pdf) => "pdftex",
        (DocFormat::Latex, MarkerStyle::Dvi) => "latex",
        (DocFormat::Latex, MarkerStyle::Pdf) => "pdflatex",
    }
}

/// Build the engine invocation's argv. `-interaction=nonstopmode` is a
/// Latex-format flag; plain `tex`/`pdftex` runs do not accept it.
fn compile_argv<'a>(engine: &'a str, format: DocFormat, basename: &'a str) -> Vec<&'a str> {
    let mut argv = vec![engine];
    if format == DocFormat::Latex {
        argv.push("-interaction=nonstopmode");
    }
    argv.push(basename);
    argv
}

fn output_written_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)output written on (\S+)").unwrap())
}

/// Scan a TeX `.log` file's contents for the line announcing where the
/// device output landed, e.g. `Output written on main.dvi (3 pages, ...)`.
fn parse_output_written_line(log: &str) -> Option<String> {
    log.lines().find_map(|l| {
        output_written_regex()
            .captures(l)
            .map(|c| c[1].trim_end_matches(['.', ',']).to_string())
    })
}

/// Run the engine, locate its device output via the `.log` file, and
/// convert that output to plain text. Returns the converted text on
/// success; the caller is responsible for running the Text-Output Parsers
/// over it.
pub fn compile_and_extract_text(
    workspace: &Workspace,
    candidate: &MainCandidate,
    marker_style: MarkerStyle,
    runner: &SubprocessRunner,
) -> std::result::Result<String, CompileFailure> {
    let engine = engine_for(candidate.format, marker_style);
    let quiet = StdioPlan {
        quiet_stdout: true,
        quiet_stderr: true,
    };

    let argv = compile_argv(engine, candidate.format, &candidate.basename);
    let status = runner.run(argv, workspace.root_dir(), COMPILE_TIMEOUT, quiet)?;

    if status == ExitStatusKind::TimedOut {
        return Err(CompileFailure::Specific(ItemError::new(
            ErrorKind::CompileTimeout,
            format!("{engine} exceeded its time budget on `{}`", candidate.basename),
        )));
    }

    let log_name = PathBuf::from(&candidate.basename).with_extension("log");
    let log_path = workspace.root_dir().join(&log_name);
    let log = match fs::read_to_string(&log_path) {
        Ok(s) => s,
        Err(_) => {
            return Err(CompileFailure::General(format!(
                "{engine} produced no log file for `{}`",
                candidate.basename
            )))
        }
    };

    let Some(output_name) = parse_output_written_line(&log) else {
        return Err(CompileFailure::General(format!(
            "no `Output written on` line in {engine}'s log for `{}`",
            candidate.basename
        )));
    };

    let output_path = workspace.root_dir().join(&output_name);
    let is_empty = fs::metadata(&output_path).map(|m| m.len() == 0).unwrap_or(true);
    if is_empty {
        return Err(CompileFailure::General(format!(
            "log claims output `{output_name}` but it is missing or empty"
        )));
    }

    convert_to_text(&output_path, marker_style, runner)
}

fn convert_to_text(
    output_path: &std::path::Path,
    marker_style: MarkerStyle,
    runner: &SubprocessRunner,
) -> std::result::Result<String, CompileFailure> {
    let workdir = output_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let text_path = output_path.with_extension("txt");
    let path_str = output_path.to_string_lossy().into_owned();

    let argv: Vec<&str> = match marker_style {
        MarkerStyle::Dvi => vec!["dvitype", &path_str],
        MarkerStyle::Pdf => vec![
            "pdftotext",
            "-raw",
            "-enc",
            "ASCII7",
            &path_str,
            text_path.to_str().unwrap_or_default(),
        ],
    };

    let quiet = StdioPlan {
        quiet_stdout: matches!(marker_style, MarkerStyle::Pdf),
        quiet_stderr: true,
    };

    let status = runner.run(argv, workdir, CONVERT_TIMEOUT, quiet)?;
    if !status.is_success() {
        return Err(CompileFailure::General(format!(
            "text conversion of `{path_str}` failed: {status:?}"
        )));
    }

    match marker_style {
        MarkerStyle::Pdf => fs::read_to_string(&text_path).map_err(|e| {
            CompileFailure::General(format!(
                "pdftotext reported success but `{}` is unreadable: {e}",
                text_path.display()
            ))
        }),
        MarkerStyle::Dvi => {
            // `dvitype` writes its trace to stdout; since we do not capture
            // it through the runner, re-run it with output captured to a
            // file so the orchestrator has something to parse.
            run_dvitype_capturing(output_path, runner)
        }
    }
}

fn run_dvitype_capturing(
    dvi_path: &std::path::Path,
    runner: &SubprocessRunner,
) -> std::result::Result<String, CompileFailure> {
    let workdir = dvi_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let out_path = dvi_path.with_extension("dvitype.txt");

    // `dvitype` has no "write to file" flag of its own; shell out through
    // `sh -c` to redirect its stdout instead.
    let cmd = format!(
        "dvitype {} > {} 2>/dev/null",
        shell_quote(&dvi_path.to_string_lossy()),
        shell_quote(&out_path.to_string_lossy())
    );

    let status = runner.run(
        ["sh", "-c", &cmd],
        workdir,
        CONVERT_TIMEOUT,
        StdioPlan {
            quiet_stdout: true,
            quiet_stderr: true,
        },
    )?;

    if !status.is_success() {
        return Err(CompileFailure::General(format!(
            "dvitype failed on `{}`: {status:?}",
            dvi_path.display()
        )));
    }

    fs::read_to_string(&out_path).map_err(|e| {
        CompileFailure::General(format!(
            "dvitype reported success but `{}` is unreadable: {e}",
            out_path.display()
        ))
    })
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_selection_matches_format_and_marker_style() {
        assert_eq!(engine_for(DocFormat::Tex, MarkerStyle::Dvi), "tex");
        assert_eq!(engine_for(DocFormat::Tex, MarkerStyle::Pdf), "pdftex");
        assert_eq!(engine_for(DocFormat::Latex, MarkerStyle::Dvi), "latex");
        assert_eq!(engine_for(DocFormat::Latex, MarkerStyle::Pdf), "pdflatex");
    }

    #[test]
    fn parses_output_written_line() {
        let log = "This is TeX\n...\nOutput written on main.dvi (3 pages, 8120 bytes).\n";
        assert_eq!(parse_output_written_line(log).as_deref(), Some("main.dvi"));
    }

    #[test]
    fn parses_output_written_line_case_insensitively() {
        let log = "output WRITTEN on paper.pdf (2 pages).\n";
        assert_eq!(parse_output_written_line(log).as_deref(), Some("paper.pdf"));
    }

    #[test]
    fn missing_output_line_is_none() {
        let log = "! Undefined control sequence.\nNo pages of output.\n";
        assert!(parse_output_written_line(log).is_none());
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's/here"), r"'it'\''s/here'");
    }

    #[test]
    fn nonstopmode_flag_is_latex_only() {
        assert_eq!(
            compile_argv("pdflatex", DocFormat::Latex, "main"),
            vec!["pdflatex", "-interaction=nonstopmode", "main"]
        );
        assert_eq!(
            compile_argv("latex", DocFormat::Latex, "main"),
            vec!["latex", "-interaction=nonstopmode", "main"]
        );
        assert_eq!(compile_argv("tex", DocFormat::Tex, "main"), vec!["tex", "main"]);
        assert_eq!(compile_argv("pdftex", DocFormat::Tex, "main"), vec!["pdftex", "main"]);
    }
}
