// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Main-File Finder.
//!
//! Scores every plausible TeX source file in a workspace and ranks them so
//! the orchestrator can try the most promising candidate first. The scoring
//! pass itself is a pure function over a file's lines
//! ([`score_candidate`]), kept free of I/O so it can be unit-tested directly;
//! [`find_main`] is the thin filesystem-walking wrapper built on `walkdir`
//! with `filter_entry` to stay one level deep.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tectonic_errors::prelude::*;
use walkdir::WalkDir;

use crate::model::{DocFormat, MainCandidate};

/// Template basenames that are near-universally boilerplate, not the actual
/// paper, with the score penalty assigned to each.
const DENYLIST: &[(&str, i32)] = &[
    ("mn2eguide", -15),
    ("mn2esample", -15),
    ("mnras_guide", -15),
    ("aa", -5),
    ("new_feat", -10),
    ("rnaas", -10),
    ("mnras_template", -15),
];

struct Patterns {
    auto_ignore: Regex,
    begin_document: Regex,
    doc_markers: Regex,
    shorttitle: Regex,
    newcommand_or_def: Regex,
    input_brace: Regex,
    input_bare: Regex,
}

fn patterns() -> &'static Patterns {
    static P: OnceLock<Patterns> = OnceLock::new();
    P.get_or_init(|| Patterns {
        auto_ignore: Regex::new(r"%auto-ignore").unwrap(),
        begin_document: Regex::new(r"\\begin\{document\}|\\documentclass|\\documentstyle").unwrap(),
        doc_markers: Regex::new(
            r"\\title\{|\\begin\{abstract\}|\\section\{INTRODUCTION\}|\\begin\{(chapthebibliography|thebibliography|references)\}",
        )
        .unwrap(),
        shorttitle: Regex::new(r"\\shorttitle\{([^}]*)\}").unwrap(),
        newcommand_or_def: Regex::new(
            r"\\(?:newcommand\{\\(\w+)\}|def\\(\w+))\{.*\\bibitem",
        )
        .unwrap(),
        input_brace: Regex::new(r"\\input\{([^}]+)\}").unwrap(),
        input_bare: Regex::new(r"\\input\s+(\S+)").unwrap(),
    })
}

/// Score one file's already-read lines. Pure: no filesystem access.
pub fn score_candidate(
    basename: &str,
    lines: &[String],
) -> (MainCandidate, Vec<String>) {
    let p = patterns();
    let mut score: i32 = 0;
    let mut format = DocFormat::Tex;
    let mut bibitem_macro = None;
    let mut title = None;
    let mut ignore = false;
    let mut not_main: Vec<String> = Vec::new();

    for (stem, penalty) in DENYLIST {
        if basename.eq_ignore_ascii_case(stem) {
            score += penalty;
        }
    }

    for line in lines {
        if p.auto_ignore.is_match(line) {
            ignore = true;
            break;
        }

        if p.begin_document.is_match(line) {
            format = DocFormat::Latex;
            score += 1;
        }

        if p.doc_markers.is_match(line) {
            score += 1;
        }

        if let Some(caps) = p.shorttitle.captures(line) {
            title = Some(caps[1].to_string());
            score += 1;
        }

        if bibitem_macro.is_none() {
            if let Some(caps) = p.newcommand_or_def.captures(line) {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string());
                bibitem_macro = name;
            }
        }

        if let Some(caps) = p.input_brace.captures(line) {
            not_main.push(caps[1].to_string());
        } else if let Some(caps) = p.input_bare.captures(line) {
            not_main.push(caps[1].to_string());
        }
    }

    if let Some(t) = &title {
        if t.len() < 10 {
            title = None;
        }
    }

    let candidate = MainCandidate {
        file: PathBuf::from(basename),
        basename: basename.to_string(),
        score,
        bibitem_macro,
        title,
        format,
        ignore,
    };

    (candidate, not_main)
}

/// Extensions that are considered at all during discovery.
fn is_candidate_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "tex" | "ltx" | "latex" | "revtex" | "bib" | "bbl" | "txt"
    )
}

/// Walk `dir` (one level deep: a workspace's top level, after unpacking) and
/// score every plausible candidate, returning them sorted by descending
/// score with macro/title defaults propagated across the ranked list.
pub fn find_main(dir: &Path) -> Result<Vec<MainCandidate>> {
    let mut candidates = Vec::new();
    let mut not_main_targets: Vec<String> = Vec::new();

    for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        if name.contains("psfig") {
            continue;
        }

        let ext = path.extension().map(|e| e.to_string_lossy().to_string());
        let has_ext = ext.is_some();
        let ext_ok = match &ext {
            Some(e) => is_candidate_extension(e),
            None => true, // no extension is accepted, per step 2
        };
        if has_ext && !ext_ok {
            continue;
        }

        // Rename `.TEX` to `.tex` on disk.
        let renamed_path = if ext.as_deref() == Some("TEX") {
            let new_path = path.with_extension("tex");
            if fs::rename(path, &new_path).is_ok() {
                new_path
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        };

        let basename = renamed_path.file_name().unwrap().to_string_lossy().to_string();

        let contents = match fs::read_to_string(&renamed_path) {
            Ok(c) => c,
            Err(_) => continue, // binary or unreadable: not a plausible main file
        };
        let lines: Vec<String> = contents.lines().map(|l| l.to_string()).collect();

        let (mut candidate, not_main) = score_candidate(&basename, &lines);
        candidate.file = renamed_path;
        not_main_targets.extend(not_main);
        candidates.push(candidate);
    }

    // Any file whose exact name (or basename) matches a recorded `\input`
    // target has its score set to -2 (exact) or -1 (basename only).
    let basenames_only: Vec<String> = not_main_targets
        .iter()
        .filter_map(|t| {
            Path::new(t)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })
        .collect();

    for c in &mut candidates {
        if not_main_targets.iter().any(|t| t == &c.basename) {
            c.score = -2;
        } else if let Some(stem) = Path::new(&c.basename).file_stem() {
            if basenames_only.iter().any(|b| b == &stem.to_string_lossy()) {
                c.score = -1;
            }
        }
    }

    candidates.sort_by(|a, b| b.score.cmp(&a.score));

    // Propagate the first non-empty bibitem_macro/title as defaults.
    let default_macro = candidates.iter().find_map(|c| c.bibitem_macro.clone());
    let default_title = candidates.iter().find_map(|c| c.title.clone());

    for c in &mut candidates {
        if c.bibitem_macro.is_none() {
            c.bibitem_macro = default_macro.clone();
        }
        if c.title.is_none() {
            c.title = default_title.clone();
        }
    }

    Ok(candidates)
}
