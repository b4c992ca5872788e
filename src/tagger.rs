// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Reference Tagger.
//!
//! Rewrites a TeX source file so that each bibliography item is bracketed
//! with extraction markers that survive typesetting, normalizes italics so
//! `dvitype`/`pdftotext` output doesn't carry stray markup, and optionally
//! remaps PostScript graphics inclusions to PDF. Each phase is a pure
//! `&str -> String` transform; the file-level entry point is a thin wrapper
//! that reads, transforms, and performs the write-to-temp-then-rename that
//! every other disk-mutating stage in this pipeline uses.

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tectonic_errors::prelude::*;
use tempfile::NamedTempFile;

use crate::model::MarkerStyle;
use crate::subprocess::{StdioPlan, SubprocessRunner};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RefType {
    Bibitem,
    Reference,
}

struct Patterns {
    begin_biblio: Regex,
    end_biblio: Regex,
    hyphen_run: Regex,
    ref_start: Regex,
    diacritic_braced: Regex,
    diacritic_cmd_braced: Regex,
    diacritic_bare: Regex,
    italic: Regex,
}

fn patterns() -> &'static Patterns {
    static P: OnceLock<Patterns> = OnceLock::new();
    P.get_or_init(|| Patterns {
        begin_biblio: Regex::new(r"\\begin\{(chapthebibliography|thebibliography|references)\}").unwrap(),
        end_biblio: Regex::new(r"\\end\{(chapthebibliography|thebibliography|references)\}").unwrap(),
        hyphen_run: Regex::new(r"\b(\w+\s*)--(\s*\w+)\b").unwrap(),
        ref_start: Regex::new(r"^\s*\\(bibitem|reference|rn|rf|rfprep|item)\b").unwrap(),
        diacritic_braced: Regex::new(r#"\{\\(`|'|\^|"|~|=|\.|H|c|b|d|u|v|t)([A-Za-z])\}"#).unwrap(),
        diacritic_cmd_braced: Regex::new(r#"\\(`|'|\^|"|~|=|\.)\{([A-Za-z])\}"#).unwrap(),
        diacritic_bare: Regex::new(r#"\\(`|'|\^|"|~|=|\.)([A-Za-z])"#).unwrap(),
        italic: Regex::new(r"\{\\em\s+([^{}]*)\}|\{\\it\s+([^{}]*)\}|\\textit\{([^{}]*)\}|\\emph\{([^{}]*)\}").unwrap(),
    })
}

/// Open/close marker tokens for a single reference, by marker style.
fn reference_markers(style: MarkerStyle) -> (&'static str, &'static str) {
    match style {
        MarkerStyle::Pdf => (
            r"\newpage\onecolumn\section*{}$<$r$>$\sloppy\raggedright",
            r"$<$/r$>$",
        ),
        MarkerStyle::Dvi => (r"\special{citation_open} ", r" \special{citation_close}"),
    }
}

/// Open/close marker tokens wrapping the whole bibliography, by marker
/// style.
fn bibliography_markers(style: MarkerStyle) -> (&'static str, &'static str) {
    match style {
        MarkerStyle::Pdf => (r"$<$references$>$", r"$<$/references$>$"),
        MarkerStyle::Dvi => (r"\special{ref_open}", r"\special{ref_close}"),
    }
}

fn strip_diacritics(body: &str) -> String {
    let p = patterns();
    let s = p.diacritic_braced.replace_all(body, "$2");
    let s = p.diacritic_cmd_braced.replace_all(&s, "$2");
    p.diacritic_bare.replace_all(&s, "$2").into_owned()
}

/// Extract a balanced `{...}` group starting at the first character of `s`,
/// if present. Returns `(inner, rest)`.
fn peel_brace(s: &str) -> Option<(String, String)> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if first != '{' {
        return None;
    }
    let mut depth = 1usize;
    for (i, c) in chars {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((s[1..i].to_string(), s[i + 1..].to_string()));
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract a balanced `[...]` group starting at the first character of `s`,
/// if present. Returns `(inner, rest)`.
fn peel_bracket(s: &str) -> Option<(String, String)> {
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if first != '[' {
        return None;
    }
    let mut depth = 1usize;
    for (i, c) in chars {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some((s[1..i].to_string(), s[i + 1..].to_string()));
                }
            }
            _ => {}
        }
    }
    None
}

struct PendingRef {
    ty: RefType,
    body: String,
}

/// Phase A: bracket each bibliography item with extraction markers.
///
/// `filename_is_bib` selects the rewind-to-top behavior for bibliography
/// -only files (`.bib`/`.bbl`) that lack a `\begin{thebibliography}`
/// preamble line.
pub fn tag_phase_a(
    text: &str,
    bibitem_macro: Option<&str>,
    marker_style: MarkerStyle,
    filename_is_bib: bool,
) -> (String, usize) {
    let result = tag_phase_a_inner(text, bibitem_macro, marker_style, false);
    if result.1 == 0 && filename_is_bib {
        return tag_phase_a_inner(text, bibitem_macro, marker_style, true);
    }
    result
}

fn tag_phase_a_inner(
    text: &str,
    bibitem_macro: Option<&str>,
    marker_style: MarkerStyle,
    no_preamble: bool,
) -> (String, usize) {
    let p = patterns();
    let mut out: Vec<String> = Vec::new();
    let mut in_biblio = no_preamble;
    let mut tagged = false;
    let mut canonical_tag: Option<String> = None;
    let mut canonical_type: Option<RefType> = None;
    let mut pending: Option<PendingRef> = None;
    let mut count = 0usize;
    let (ref_open, ref_close) = reference_markers(marker_style);
    let (bib_open, bib_close) = bibliography_markers(marker_style);

    let flush = |pending: &mut Option<PendingRef>,
                 out: &mut Vec<String>,
                 count: &mut usize,
                 tag: &str| {
        if let Some(p) = pending.take() {
            out.push(emit_reference(tag, p.ty, &p.body, ref_open, ref_close));
            *count += 1;
        }
    };

    for raw_line in text.lines() {
        if !in_biblio {
            if p.begin_biblio.is_match(raw_line) {
                in_biblio = true;
                out.push(raw_line.to_string());
                out.push(bib_open.to_string());
            } else {
                out.push(raw_line.to_string());
            }
            continue;
        }

        let trimmed = raw_line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        if p.end_biblio.is_match(raw_line) {
            if let Some(tag) = &canonical_tag {
                flush(&mut pending, &mut out, &mut count, tag);
            }
            out.push(bib_close.to_string());
            out.push(raw_line.to_string());
            in_biblio = false;
            continue;
        }

        let collapsed = p.hyphen_run.replace_all(raw_line, "$1-$2").into_owned();

        let (macro_name, is_custom) = match bibitem_macro {
            Some(m) if collapsed.trim_start().starts_with(&format!("\\{m}")) => {
                (Some(m.to_string()), true)
            }
            _ => (None, false),
        };

        let starts_ref = is_custom || p.ref_start.is_match(&collapsed);

        if starts_ref {
            if let Some(tag) = &canonical_tag {
                flush(&mut pending, &mut out, &mut count, tag);
            }

            let (tag, ty, rest) = if is_custom {
                let m = macro_name.unwrap();
                let rest = collapsed.trim_start()[m.len() + 1..].to_string();
                (m, RefType::Bibitem, rest)
            } else {
                let caps = p.ref_start.captures(&collapsed).unwrap();
                let word = caps.get(1).unwrap().as_str().to_string();
                let ty = match word.as_str() {
                    "reference" => RefType::Reference,
                    _ => RefType::Bibitem,
                };
                let start = caps.get(0).unwrap().end();
                (word, ty, collapsed[start..].to_string())
            };

            if canonical_tag.is_none() {
                canonical_tag = Some(tag);
                canonical_type = Some(ty);
            }

            pending = Some(PendingRef {
                ty: canonical_type.unwrap_or(ty),
                body: rest,
            });
        } else if let Some(p) = &mut pending {
            p.body.push(' ');
            p.body.push_str(&collapsed);
        } else {
            // Stray line before the first reference macro inside the
            // bibliography environment: pass through untouched.
            out.push(raw_line.to_string());
        }
    }

    (out.join("\n") + "\n", count)
}

fn emit_reference(tag: &str, ty: RefType, body: &str, open: &str, close: &str) -> String {
    let body = body.trim();

    let (prefix_args, remainder) = match ty {
        RefType::Bibitem => {
            let (label, rest) = match peel_bracket(body) {
                Some((label, rest)) => (Some(label), rest),
                None => (None, body.to_string()),
            };
            let (key, rest) = match peel_brace(rest.trim_start()) {
                Some((key, rest)) => (Some(key), rest),
                None => (None, rest),
            };
            let mut prefix = String::new();
            if let Some(label) = label {
                prefix.push('[');
                prefix.push_str(&label);
                prefix.push(']');
            }
            if let Some(key) = key {
                prefix.push('{');
                prefix.push_str(&key);
                prefix.push('}');
            }
            (prefix, rest)
        }
        RefType::Reference => {
            let (bibcode, rest) = match peel_brace(body) {
                Some((bibcode, rest)) => (Some(bibcode), rest),
                None => (None, body.to_string()),
            };
            let mut prefix = String::new();
            if let Some(bibcode) = bibcode {
                prefix.push('{');
                prefix.push_str(&bibcode);
                prefix.push('}');
            }
            (prefix, rest)
        }
    };

    let cleaned_body = strip_diacritics(remainder.trim());

    format!("\\{tag}{prefix_args} {open}{cleaned_body}\n{close}", tag = tag, prefix_args = prefix_args, open = open, cleaned_body = cleaned_body, close = close)
}

/// Phase B: replace italic/emphasis markup with plain quoted text, over the
/// whole file (not just the bibliography range).
pub fn tag_phase_b(text: &str) -> String {
    patterns()
        .italic
        .replace_all(text, |caps: &regex::Captures| {
            let inner = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            format!("\"{inner}\"")
        })
        .into_owned()
}

/// Rewrite a TeX source file with Phases A and B applied, writing the
/// result via write-to-temp-then-rename. When `convert_ps` is set, also runs
/// Phase C (graphics remapping) over the file's containing directory before
/// returning. Returns the number of references tagged.
pub fn tag_refs(
    path: &Path,
    bibitem_macro: Option<&str>,
    marker_style: MarkerStyle,
    convert_ps: bool,
    runner: &SubprocessRunner,
) -> Result<usize> {
    let contents = atry!(
        fs::read_to_string(path);
        ["failed to read `{}` for reference tagging", path.display()]
    );

    let filename_is_bib = path
        .extension()
        .map(|e| {
            let e = e.to_string_lossy().to_ascii_lowercase();
            e == "bib" || e == "bbl"
        })
        .unwrap_or(false);

    let (tagged, count) = tag_phase_a(&contents, bibitem_macro, marker_style, filename_is_bib);
    let final_text = tag_phase_b(&tagged);

    write_atomically(path, &final_text)?;

    if convert_ps {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        convert_graphics(dir, runner)?;
    }

    Ok(count)
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = atry!(
        NamedTempFile::new_in(dir);
        ["failed to create temporary file alongside `{}`", path.display()]
    );

    use std::io::Write;
    atry!(
        tmp.write_all(contents.as_bytes());
        ["failed to write rewritten contents for `{}`", path.display()]
    );

    atry!(
        tmp.persist(path);
        ["failed to replace `{}` with its rewritten contents", path.display()]
    );

    Ok(())
}

/// Phase C: remap PostScript graphics inclusions to PDF across every source
/// file in `dir`, converting any `.ps`/`.eps`/`.epsi`/`.epsf` file on disk
/// that lacks a `.pdf` counterpart via `epstopdf`.
pub fn convert_graphics(dir: &Path, runner: &SubprocessRunner) -> Result<()> {
    let ps_ext = Regex::new(r"(?i)\.(ps|eps|epsi|epsf)\b").unwrap();

    for entry in walkdir::WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let is_source = matches!(
            path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()),
            Some(ref e) if e == "tex" || e == "ltx" || e == "latex"
        );
        if is_source {
            if let Ok(contents) = fs::read_to_string(path) {
                if ps_ext.is_match(&contents) {
                    let rewritten = ps_ext.replace_all(&contents, ".pdf").into_owned();
                    write_atomically(path, &rewritten)?;
                }
            }
        }

        let ext_lower = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase());
        if matches!(ext_lower.as_deref(), Some("ps") | Some("eps") | Some("epsi") | Some("epsf")) {
            let pdf_path = path.with_extension("pdf");
            if !pdf_path.exists() {
                let _ = runner.run(
                    ["epstopdf", path.to_str().unwrap_or_default()],
                    dir,
                    Duration::from_secs(5),
                    StdioPlan {
                        quiet_stdout: true,
                        quiet_stderr: true,
                    },
                );
            }
        }
    }

    Ok(())
}
