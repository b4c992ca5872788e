// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The collaborator seam.
//!
//! The orchestrator depends on a handful of services that sit outside this
//! pipeline's scope: turning a raw path into an
//! [`ArxivItem`], resolving a bibcode, harvesting a PDF from the ArXiv
//! mirror, and extracting references straight out of a PDF when no TeX
//! source exists. [`Collaborators`] names that seam so the orchestrator can
//! be tested against a fake without any of the real, network- or
//! filesystem-heavy implementations running.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tectonic_errors::prelude::*;

use crate::model::{ArxivItem, Reference};

/// External services the orchestrator calls out to but does not implement
/// itself.
pub trait Collaborators {
    /// Parse a raw ArXiv storage path into its structured form.
    fn parse_arxiv_path(&self, raw_path: &str) -> Result<ArxivItem>;

    /// A partial bibcode derived purely from `item` (year, category, an
    /// identifier fragment), used before a full ADS lookup is attempted.
    fn partial_bibcode(&self, item: &ArxivItem) -> String;

    /// Resolve a full bibcode and accession number for `item`, if the
    /// external bibliographic database has one on file.
    fn lookup_bibcode(&self, item: &ArxivItem) -> Result<Option<(String, Option<String>)>>;

    /// Fetch (or regenerate) a PDF rendering of `item` into `dest`, used as
    /// the PDF-fallback path when TeX compilation is unavailable or fails.
    fn harvest_pdf(&self, item: &ArxivItem, dest: &Path) -> Result<()>;

    /// Extract references directly from a PDF with no TeX source at all.
    fn extract_pdf_references(&self, pdf_path: &Path) -> Result<Vec<Reference>>;

    /// The full set of ArXiv category names known to the caller, used by the
    /// Text-Output Parsers to repair hyphen-split category names.
    fn arxiv_categories(&self) -> &HashSet<String>;
}

fn known_categories() -> &'static HashSet<String> {
    static CATS: OnceLock<HashSet<String>> = OnceLock::new();
    CATS.get_or_init(|| {
        [
            "astro-ph",
            "cond-mat",
            "gr-qc",
            "hep-ex",
            "hep-lat",
            "hep-ph",
            "hep-th",
            "math-ph",
            "nucl-ex",
            "nucl-th",
            "quant-ph",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    })
}

/// A reference-quality implementation of [`Collaborators`] suitable for
/// standalone use and for the orchestrator's own tests: no network access,
/// a deterministic path parser, and a PDF harvester/extractor that report
/// "not available" rather than silently fabricating data.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceCollaborators;

impl ReferenceCollaborators {
    pub fn new() -> Self {
        ReferenceCollaborators
    }
}

impl Collaborators for ReferenceCollaborators {
    fn parse_arxiv_path(&self, raw_path: &str) -> Result<ArxivItem> {
        parse_arxiv_path(raw_path)
    }

    fn partial_bibcode(&self, item: &ArxivItem) -> String {
        format!("{}arXiv{}", item.year, item.eprint_id.replace('.', ""))
    }

    fn lookup_bibcode(&self, _item: &ArxivItem) -> Result<Option<(String, Option<String>)>> {
        Ok(None)
    }

    fn harvest_pdf(&self, item: &ArxivItem, _dest: &Path) -> Result<()> {
        bail!(
            "no PDF harvester configured; cannot fetch a rendering for {}",
            item.raw_path
        )
    }

    fn extract_pdf_references(&self, pdf_path: &Path) -> Result<Vec<Reference>> {
        bail!(
            "no PDF-native reference extractor configured for {}",
            pdf_path.display()
        )
    }

    fn arxiv_categories(&self) -> &HashSet<String> {
        known_categories()
    }
}

/// Parse a path of the form `<category>/<year><rest...>/<eprint>.<suffix>`
/// (old-style, pre-2007 identifiers) or `<year><month>/<eprint>.<suffix>`
/// (new-style) into an [`ArxivItem`].
fn parse_arxiv_path(raw_path: &str) -> Result<ArxivItem> {
    let path = Path::new(raw_path);
    let filename = atry!(
        path.file_name().and_then(|f| f.to_str());
        ["path has no file name component: {raw_path}"]
    );

    let (stem, suffix) = split_suffix(filename)
        .ok_or_else(|| anyhow!("cannot determine archive suffix for {raw_path}"))?;

    let components: Vec<&str> = path
        .parent()
        .map(|p| p.iter().filter_map(|c| c.to_str()).collect())
        .unwrap_or_default();

    let (category, eprint_id, year, month) = if let Some(last) = components.last() {
        if last.len() >= 4 && last.chars().take(4).all(|c| c.is_ascii_digit()) {
            // New-style: <yymm>/<eprint>
            let yy: u32 = last[0..2].parse().unwrap_or(0);
            let mm: u32 = last[2..4].parse().unwrap_or(1);
            let year = if yy < 91 { 2000 + yy } else { 1900 + yy };
            ("".to_string(), stem.to_string(), year, mm.clamp(1, 12))
        } else {
            // Old-style: <category>/<yymm-rest>/<eprint>
            let category = last.to_string();
            let yy: u32 = stem.get(0..2).and_then(|s| s.parse().ok()).unwrap_or(0);
            let mm: u32 = stem.get(2..4).and_then(|s| s.parse().ok()).unwrap_or(1);
            let year = if yy < 91 { 2000 + yy } else { 1900 + yy };
            (category, stem.to_string(), year, mm.clamp(1, 12))
        }
    } else {
        bail!("path has no directory component to derive a category from: {raw_path}");
    };

    Ok(ArxivItem {
        raw_path: raw_path.to_string(),
        eprint_id,
        category,
        year,
        month,
        suffix: suffix.to_string(),
        canonical_relpath: raw_path.to_string(),
    })
}

/// Split `name` into `(stem, suffix)` recognizing the compound
/// `tar.gz`/`tex.gz`/`pdf.gz` suffixes before falling back to the last
/// extension.
fn split_suffix(name: &str) -> Option<(&str, &str)> {
    for compound in ["tar.gz", "tex.gz", "pdf.gz"] {
        if let Some(stem) = name.strip_suffix(&format!(".{compound}")) {
            return Some((stem, compound));
        }
    }
    let dot = name.rfind('.')?;
    Some((&name[..dot], &name[dot + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_style_path() {
        let item = parse_arxiv_path("0704/0704.0001.tar.gz").unwrap();
        assert_eq!(item.eprint_id, "0704.0001");
        assert_eq!(item.suffix, "tar.gz");
        assert_eq!(item.year, 2007);
    }

    #[test]
    fn parses_old_style_path_with_category() {
        let item = parse_arxiv_path("astro-ph/9901001.tar.gz").unwrap();
        assert_eq!(item.category, "astro-ph");
        assert_eq!(item.eprint_id, "9901001");
        assert_eq!(item.suffix, "tar.gz");
        assert_eq!(item.year, 1999);
    }

    #[test]
    fn recognizes_bare_pdf_suffix() {
        let item = parse_arxiv_path("astro-ph/9901001.pdf").unwrap();
        assert_eq!(item.suffix, "pdf");
    }

    #[test]
    fn rejects_path_with_no_suffix() {
        assert!(parse_arxiv_path("astro-ph/noextension").is_err());
    }

    #[test]
    fn reference_collaborators_partial_bibcode_is_deterministic() {
        let c = ReferenceCollaborators::new();
        let item = parse_arxiv_path("0704/0704.0001.tar.gz").unwrap();
        assert_eq!(c.partial_bibcode(&item), "2007arXiv07040001");
    }

    #[test]
    fn reference_collaborators_has_no_network_side_effects() {
        let c = ReferenceCollaborators::new();
        let item = parse_arxiv_path("0704/0704.0001.tar.gz").unwrap();
        assert!(c.lookup_bibcode(&item).unwrap().is_none());
        assert!(c.harvest_pdf(&item, Path::new("/tmp/x.pdf")).is_err());
        assert!(c.extract_pdf_references(Path::new("/tmp/x.pdf")).is_err());
    }

    #[test]
    fn known_categories_include_hyphenated_ones() {
        let c = ReferenceCollaborators::new();
        assert!(c.arxiv_categories().contains("astro-ph"));
    }
}
