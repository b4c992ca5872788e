// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The Workspace Manager.
//!
//! Each item gets a fresh scratch directory, guaranteed to be destroyed when
//! the workspace goes out of scope unless the caller asked to keep it around
//! for debugging: a scoped resource with guaranteed cleanup, for an entire
//! directory tree rather than a single file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tectonic_errors::prelude::*;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A scratch directory scoped to one item's processing attempt.
///
/// `Workspace` is not `Clone`; at most one is alive per
/// [`crate::orchestrator::ExtractionContext`] at a time, and a workspace is
/// never reused across items.
pub struct Workspace {
    root_dir: PathBuf,
    keep_on_exit: bool,
}

impl Workspace {
    /// Allocate a fresh, empty scratch directory under `scratch_root`. The
    /// directory name includes the process id and a monotonic counter so
    /// that concurrent pipeline processes (each a separate OS process) never
    /// collide.
    pub fn acquire(scratch_root: &Path, debug: u8) -> Result<Workspace> {
        let pid = std::process::id();
        let n = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = scratch_root.join(format!("refextract-wsp-{pid}-{n}"));

        atry!(
            fs::create_dir_all(&dir);
            ["failed to create workspace directory `{}`", dir.display()]
        );

        Ok(Workspace {
            root_dir: dir,
            keep_on_exit: debug > 1,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Scoped acquisition: create a workspace, hand it to `body`, and
    /// guarantee its destruction (unless `debug > 1`) and the restoration of
    /// the caller's working directory, regardless of how `body` returns.
    pub fn with<T>(
        scratch_root: &Path,
        debug: u8,
        body: impl FnOnce(&Workspace) -> Result<T>,
    ) -> Result<T> {
        let saved_cwd = atry!(
            std::env::current_dir();
            ["failed to read the current working directory"]
        );

        let ws = Workspace::acquire(scratch_root, debug)?;
        let result = body(&ws);

        // Restore cwd before the workspace's Drop runs, so that directory
        // removal never races against "rmdir of the directory I'm sitting
        // in".
        let _ = std::env::set_current_dir(&saved_cwd);

        result
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep_on_exit {
            eprintln!("note: retaining workspace `{}` (debug>1)", self.root_dir.display());
            return;
        }

        if let Err(e) = fs::remove_dir_all(&self.root_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                eprintln!(
                    "warning: failed to remove workspace `{}`: {e}",
                    self.root_dir.display()
                );
            }
        }
    }
}
