// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The core data model: items, jobs, source formats, and the records that
//! flow between the pipeline's stages.

use std::path::PathBuf;

/// One ArXiv preprint, as resolved by the external path parser collaborator.
/// Immutable for the lifetime of a single extraction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArxivItem {
    pub raw_path: String,
    pub eprint_id: String,
    pub category: String,
    pub year: u32,
    pub month: u32,
    pub suffix: String,
    pub canonical_relpath: String,
}

/// One row of the batch input, after bibcode/subdate resolution.
#[derive(Clone, Debug)]
pub struct Job {
    pub item: ArxivItem,
    pub bibcode: String,
    pub accno: Option<String>,
    pub subdate: u32,
}

/// The format family an item's source archive belongs to, derived from its
/// suffix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceFormat {
    Tex,
    Pdf,
}

impl SourceFormat {
    /// Classify a suffix into its source format. Returns `None`
    /// for any suffix that does not correspond to a known format, in which
    /// case the caller should skip the item with [`crate::error::ErrorKind::UnknownFormat`].
    pub fn classify(suffix: &str) -> Option<SourceFormat> {
        let s = suffix.to_ascii_lowercase();
        match s.as_str() {
            "tar.gz" | "tar" | "tex.gz" | "tex" | "gz" => Some(SourceFormat::Tex),
            "pdf" | "pdf.gz" => Some(SourceFormat::Pdf),
            _ => None,
        }
    }
}

/// A candidate "main" TeX file discovered by the Main-File Finder, with its
/// accumulated score and the attributes later stages need.
#[derive(Clone, Debug)]
pub struct MainCandidate {
    pub file: PathBuf,
    pub basename: String,
    pub score: i32,
    pub bibitem_macro: Option<String>,
    pub title: Option<String>,
    pub format: DocFormat,
    pub ignore: bool,
}

/// Whether a candidate file looks like plain TeX or a LaTeX document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocFormat {
    Tex,
    Latex,
}

/// The era-appropriate TeX install to put on `PATH` for a compile step.
#[derive(Clone, Debug)]
pub struct Toolchain {
    pub path_prepend: Vec<PathBuf>,
    pub texmf_cnf: Option<PathBuf>,
}

/// Which family of extraction-marker tokens the Reference Tagger should
/// inject, determined by whether the downstream text conversion will read
/// PDF text or `dvitype` output.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MarkerStyle {
    Pdf,
    Dvi,
}

/// A single unstructured reference string, as it will appear as one line in
/// the output file.
pub type Reference = String;

/// The result of attempting to extract references from one item.
#[derive(Clone, Debug)]
pub enum ExtractionOutcome {
    Ok(Vec<Reference>),
    Empty,
    TooFew(usize),
    Failed(String),
    /// The output file is already newer than the input; nothing to do
    /// unless the caller passed `--force`.
    Skipped,
}

impl ExtractionOutcome {
    pub fn from_refs(refs: Vec<Reference>, threshold: usize) -> ExtractionOutcome {
        if refs.is_empty() {
            ExtractionOutcome::Empty
        } else if refs.len() < threshold {
            ExtractionOutcome::TooFew(refs.len())
        } else {
            ExtractionOutcome::Ok(refs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tex_suffixes() {
        for s in ["tar.gz", "tar", "tex.gz", "tex", "gz", "TAR.GZ"] {
            assert_eq!(SourceFormat::classify(s), Some(SourceFormat::Tex), "{s}");
        }
    }

    #[test]
    fn classify_pdf_suffixes() {
        assert_eq!(SourceFormat::classify("pdf"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::classify("pdf.gz"), Some(SourceFormat::Pdf));
    }

    #[test]
    fn classify_unknown() {
        assert_eq!(SourceFormat::classify("docx"), None);
        assert_eq!(SourceFormat::classify(""), None);
    }

    #[test]
    fn outcome_thresholding() {
        let refs: Vec<Reference> = vec!["a".into(), "b".into(), "c".into()];
        match ExtractionOutcome::from_refs(refs, 4) {
            ExtractionOutcome::TooFew(3) => {}
            other => panic!("expected TooFew(3), got {other:?}"),
        }

        let refs: Vec<Reference> = (0..4).map(|i| i.to_string()).collect();
        match ExtractionOutcome::from_refs(refs, 4) {
            ExtractionOutcome::Ok(v) => assert_eq!(v.len(), 4),
            other => panic!("expected Ok, got {other:?}"),
        }

        match ExtractionOutcome::from_refs(Vec::new(), 4) {
            ExtractionOutcome::Empty => {}
            other => panic!("expected Empty, got {other:?}"),
        }
    }
}
