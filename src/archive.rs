// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Archive Unpacker.
//!
//! Normalizes an arbitrary ArXiv source archive into a directory of loose
//! source files, dispatching to external `tar`/`gunzip` via the Subprocess
//! Runner rather than pulling in an archive-handling crate, so that this
//! stage gains the same timeout protection as every other external-tool
//! invocation in the pipeline.

use std::fs;
use std::path::Path;
use std::time::Duration;
use tectonic_errors::prelude::*;

use crate::subprocess::{StdioPlan, SubprocessRunner};
use crate::workspace::Workspace;

/// Generous but finite: a corrupt archive should not be able to hang a
/// batch run forever.
const UNPACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy `input_file` into `workspace` and normalize it into a directory of
/// TeX source files, dispatching on its extension.
pub fn unpack(workspace: &Workspace, input_file: &Path, runner: &SubprocessRunner) -> Result<()> {
    let file_name = atry!(
        input_file.file_name().ok_or_else(|| anyhow!("input path has no file name"));
        ["cannot unpack `{}`", input_file.display()]
    );

    let dest = workspace.root_dir().join(file_name);
    atry!(
        fs::copy(input_file, &dest);
        ["failed to copy `{}` into workspace", input_file.display()]
    );

    let lower = dest.to_string_lossy().to_ascii_lowercase();
    let quiet = StdioPlan {
        quiet_stdout: true,
        quiet_stderr: true,
    };

    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        run_checked(
            runner,
            ["tar", "xzf", dest.to_str().unwrap()],
            workspace,
            quiet,
        )?;
    } else if lower.ends_with(".tar") {
        run_checked(
            runner,
            ["tar", "xf", dest.to_str().unwrap()],
            workspace,
            quiet,
        )?;
    } else if lower.ends_with(".tex.gz") || lower.ends_with(".gz") {
        run_checked(runner, ["gunzip", "-f", dest.to_str().unwrap()], workspace, quiet)?;
    } else if lower.ends_with(".tex") {
        // Already plain TeX; nothing further to do.
    } else {
        // Unknown extension: treat as plain TeX by appending `.tex`.
        let mut renamed = dest.clone();
        let new_name = format!("{}.tex", file_name.to_string_lossy());
        renamed.set_file_name(new_name);
        atry!(
            fs::rename(&dest, &renamed);
            ["failed to rename `{}` to `{}`", dest.display(), renamed.display()]
        );
    }

    let has_regular_file = atry!(
        fs::read_dir(workspace.root_dir());
        ["failed to list workspace directory after unpacking"]
    )
    .filter_map(|e| e.ok())
    .any(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false));

    ensure!(
        has_regular_file,
        "unpacking `{}` produced no regular files",
        input_file.display()
    );

    Ok(())
}

fn run_checked<'a>(
    runner: &SubprocessRunner,
    argv: impl IntoIterator<Item = &'a str>,
    workspace: &Workspace,
    stdio: StdioPlan,
) -> Result<()> {
    let status = runner.run(argv, workspace.root_dir(), UNPACK_TIMEOUT, stdio)?;
    ensure!(status.is_success(), "archive-unpacking subprocess failed: {status:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tex_is_a_noop() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(root.path(), 0).unwrap();
        let input = root.path().join("main.tex");
        fs::write(&input, "\\documentclass{article}").unwrap();

        unpack(&ws, &input, &SubprocessRunner::new()).unwrap();
        assert!(ws.root_dir().join("main.tex").exists());
    }

    #[test]
    fn unknown_extension_gets_tex_suffix() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(root.path(), 0).unwrap();
        let input = root.path().join("source.txt2");
        fs::write(&input, "content").unwrap();

        unpack(&ws, &input, &SubprocessRunner::new()).unwrap();
        assert!(ws.root_dir().join("source.txt2.tex").exists());
    }

    #[test]
    fn tar_gz_is_extracted() {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("mk");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("main.tex"), "\\documentclass{article}").unwrap();

        let archive = root.path().join("2111.03186.tar.gz");
        let status = std::process::Command::new("tar")
            .args(["czf", archive.to_str().unwrap(), "-C", work.to_str().unwrap(), "main.tex"])
            .status()
            .unwrap();
        assert!(status.success());

        let ws = Workspace::acquire(root.path(), 0).unwrap();
        unpack(&ws, &archive, &SubprocessRunner::new()).unwrap();
        assert!(ws.root_dir().join("main.tex").exists());
    }
}
