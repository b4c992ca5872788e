// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Toolchain Selector.
//!
//! A deterministic mapping from an item's submission date to the
//! era-appropriate TeX install, applied as a scoped `PATH`/`TEXMFCNF`
//! mutation around the compile step only.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::model::Toolchain;

impl Toolchain {
    /// Select the toolchain for a given `subdate` (`YYYYMMDD`), rooted at
    /// `texbase`. The ladder is evaluated from newest to oldest; the first
    /// threshold the subdate meets or exceeds wins.
    pub fn for_subdate(subdate: u32, texbase: &Path) -> Toolchain {
        let (tree, texmf_cnf) = if subdate >= 20_170_209 {
            ("TL2016", None)
        } else if subdate >= 20_111_206 {
            ("TL2011", None)
        } else if subdate >= 20_091_231 {
            ("TL2009", None)
        } else if subdate >= 20_061_102 {
            ("teTeX3", Some("teTeX3/web2c"))
        } else if subdate >= 20_040_101 {
            ("teTeX2", Some("texmf-2004/web2c"))
        } else if subdate >= 20_030_101 {
            ("teTeX2", Some("texmf-2003/web2c"))
        } else if subdate >= 20_020_901 {
            ("teTeX2", Some("texmf-2002/web2c"))
        } else {
            ("teTeX2", Some("texmf/web2c"))
        };

        Toolchain {
            path_prepend: vec![texbase.join(tree).join("bin")],
            texmf_cnf: texmf_cnf.map(|rel| texbase.join(rel)),
        }
    }
}

/// A scoped mutation of `PATH` and `TEXMFCNF`, restored to their prior
/// values on drop. Applied around the compile step only, so the process
/// environment is always restored before the orchestrator returns, on
/// every exit path.
pub struct EnvFrame {
    saved_path: Option<OsString>,
    saved_texmf_cnf: Option<OsString>,
}

impl EnvFrame {
    pub fn apply(toolchain: &Toolchain) -> EnvFrame {
        let saved_path = env::var_os("PATH");
        let saved_texmf_cnf = env::var_os("TEXMFCNF");

        let mut new_path = OsString::new();
        for (i, dir) in toolchain.path_prepend.iter().enumerate() {
            if i > 0 {
                new_path.push(":");
            }
            new_path.push(dir.as_os_str());
        }
        if let Some(old) = &saved_path {
            if !new_path.is_empty() {
                new_path.push(":");
            }
            new_path.push(old);
        }
        env::set_var("PATH", &new_path);

        match &toolchain.texmf_cnf {
            Some(dir) => env::set_var("TEXMFCNF", dir),
            None => env::remove_var("TEXMFCNF"),
        }

        EnvFrame {
            saved_path,
            saved_texmf_cnf,
        }
    }
}

impl Drop for EnvFrame {
    fn drop(&mut self) {
        match self.saved_path.take() {
            Some(p) => env::set_var("PATH", p),
            None => env::remove_var("PATH"),
        }
        match self.saved_texmf_cnf.take() {
            Some(v) => env::set_var("TEXMFCNF", v),
            None => env::remove_var("TEXMFCNF"),
        }
    }
}

/// Convenience used by [`Toolchain::for_subdate`]'s callers that only need
/// the raw directory, e.g. tests.
pub fn bin_dir(toolchain: &Toolchain) -> Option<&PathBuf> {
    toolchain.path_prepend.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn tc(subdate: u32) -> Toolchain {
        Toolchain::for_subdate(subdate, Path::new("/tex"))
    }

    #[test]
    fn ladder_boundaries() {
        assert!(bin_dir(&tc(20_170_209)).unwrap().ends_with("TL2016/bin"));
        assert!(bin_dir(&tc(20_170_208)).unwrap().ends_with("TL2011/bin"));
        assert!(bin_dir(&tc(20_111_206)).unwrap().ends_with("TL2011/bin"));
        assert!(bin_dir(&tc(20_111_205)).unwrap().ends_with("TL2009/bin"));
        assert!(bin_dir(&tc(20_091_231)).unwrap().ends_with("TL2009/bin"));
        assert!(bin_dir(&tc(20_091_230)).unwrap().ends_with("teTeX3/bin"));
        assert!(bin_dir(&tc(20_061_102)).unwrap().ends_with("teTeX3/bin"));
        assert!(bin_dir(&tc(20_061_101)).unwrap().ends_with("teTeX2/bin"));
        assert!(tc(20_061_101).texmf_cnf.unwrap().ends_with("texmf-2004/web2c"));
        assert!(tc(20_040_101).texmf_cnf.unwrap().ends_with("texmf-2004/web2c"));
        assert!(tc(20_031_231).texmf_cnf.unwrap().ends_with("texmf-2003/web2c"));
        assert!(tc(20_030_101).texmf_cnf.unwrap().ends_with("texmf-2003/web2c"));
        assert!(tc(20_021_231).texmf_cnf.unwrap().ends_with("texmf-2002/web2c"));
        assert!(tc(20_020_901).texmf_cnf.unwrap().ends_with("texmf-2002/web2c"));
        assert!(tc(20_020_900).texmf_cnf.unwrap().ends_with("texmf/web2c"));
        assert!(tc(19_950_101).texmf_cnf.unwrap().ends_with("texmf/web2c"));
    }

    #[test]
    fn new_trees_have_no_texmf_cnf() {
        assert!(tc(20_170_209).texmf_cnf.is_none());
        assert!(tc(20_091_231).texmf_cnf.is_none());
    }

    #[test]
    fn env_frame_restores_previous_values() {
        env::set_var("PATH", "/before/path");
        env::set_var("TEXMFCNF", "/before/cnf");

        {
            let _frame = EnvFrame::apply(&tc(20_170_209));
            assert!(env::var("PATH").unwrap().contains("TL2016"));
            assert!(env::var("TEXMFCNF").is_err());
        }

        assert_eq!(env::var("PATH").unwrap(), "/before/path");
        assert_eq!(env::var("TEXMFCNF").unwrap(), "/before/cnf");
    }
}
