// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! Process-wide configuration: the four environment variables the core
//! consumes, each overridable by a batch-driver CLI flag.

use std::env;
use std::path::PathBuf;

const ENV_SCRATCH: &str = "REFEXTRACT_SCRATCH";
const ENV_PBASE: &str = "REFEXTRACT_PBASE";
const ENV_TBASE: &str = "REFEXTRACT_TBASE";
const ENV_TEXBASE: &str = "REFEXTRACT_TEXBASE";

/// Process-wide configuration for a batch run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory under which per-item scratch workspaces are created.
    pub scratch_root: PathBuf,
    /// Fulltext base: where harvested/full-text PDFs live, keyed by
    /// canonical relpath.
    pub pbase: PathBuf,
    /// Output base: where `.raw` reference files are written.
    pub tbase: PathBuf,
    /// TeX toolchain root: parent of the era-specific toolchain trees.
    pub texbase: PathBuf,
    pub force: bool,
    pub try_pdf: bool,
    pub try_harvest: bool,
    pub skip_refs: bool,
    pub debug: u8,
}

impl Config {
    /// Build a configuration by reading environment variables, falling back
    /// to reasonable defaults so the pipeline can run standalone in a
    /// scratch sandbox without any setup.
    pub fn from_env() -> Config {
        Config {
            scratch_root: env::var_os(ENV_SCRATCH)
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            pbase: env::var_os(ENV_PBASE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("fulltext")),
            tbase: env::var_os(ENV_TBASE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("refout")),
            texbase: env::var_os(ENV_TEXBASE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/usr/local/texlive")),
            force: false,
            try_pdf: true,
            try_harvest: true,
            skip_refs: false,
            debug: 0,
        }
    }

    /// The minimum number of references required to accept an extraction
    /// and emit an output file. Exposed as a method (rather than a bare
    /// constant used inline) so tests can reference it symbolically.
    pub fn min_references(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_env() {
        let cfg = Config::from_env();
        assert_eq!(cfg.min_references(), 4);
        assert!(!cfg.force);
        assert!(cfg.try_pdf);
    }
}
