// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! Output-file emission.
//!
//! Writes the accepted reference list for one item to its final location
//! under the output base, using the same write-to-temp-then-rename pattern
//! as the Reference Tagger's file rewrites, so a reader of the output tree
//! never observes a half-written `.raw` file.

use std::fs;
use std::path::Path;
use tectonic_errors::prelude::*;
use tempfile::NamedTempFile;

use crate::model::Reference;

/// Render one item's accepted references as `%R <bibcode>\n%Z\n<refs...>` and
/// write them atomically to `out_path`, creating any missing parent
/// directories first.
pub fn write_output(out_path: &Path, bibcode: &str, refs: &[Reference]) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        atry!(
            fs::create_dir_all(parent);
            ["failed to create output directory `{}`", parent.display()]
        );
    }

    let mut body = String::new();
    body.push_str("%R ");
    body.push_str(bibcode);
    body.push('\n');
    body.push_str("%Z\n");
    for r in refs {
        body.push_str(r);
        body.push('\n');
    }

    let dir = out_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = atry!(
        NamedTempFile::new_in(dir);
        ["failed to create temporary file alongside `{}`", out_path.display()]
    );

    use std::io::Write;
    atry!(
        tmp.write_all(body.as_bytes());
        ["failed to write output contents for `{}`", out_path.display()]
    );

    atry!(
        tmp.persist(out_path);
        ["failed to replace `{}` with its final contents", out_path.display()]
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_expected_format() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("refout").join("2001ApJ...1S.raw");
        let refs = vec!["Smith, J. 2001, ApJ".to_string(), "Jones, K. 2002, ApJ".to_string()];

        write_output(&out_path, "2001ApJ...1S", &refs).unwrap();

        let contents = fs::read_to_string(&out_path).unwrap();
        assert_eq!(
            contents,
            "%R 2001ApJ...1S\n%Z\nSmith, J. 2001, ApJ\nJones, K. 2002, ApJ\n"
        );
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("a").join("b").join("c.raw");
        write_output(&out_path, "bib", &["x".to_string()]).unwrap();
        assert!(out_path.exists());
    }

    #[test]
    fn overwrites_existing_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("c.raw");
        write_output(&out_path, "bib", &["old".to_string()]).unwrap();
        write_output(&out_path, "bib", &["new".to_string()]).unwrap();
        let contents = fs::read_to_string(&out_path).unwrap();
        assert!(contents.contains("new"));
        assert!(!contents.contains("old"));
    }
}
