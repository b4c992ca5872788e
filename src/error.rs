// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! The per-item error taxonomy.
//!
//! Every failure that can befall a single batch item is represented as an
//! [`ItemError`] carrying one of the closed [`ErrorKind`] variants. This is
//! distinct from [`tectonic_errors::Error`], which is used for infrastructure
//! failures (I/O, spawn failures, malformed internal state) as they propagate
//! through individual components; the orchestrator is responsible for mapping
//! those into the appropriate `ErrorKind` before they reach the batch driver.

use std::fmt;
use tectonic_errors::Error as DynError;

/// The kinds of failure a single item can experience. None of these, except
/// [`ErrorKind::InternalInvariantViolated`], are fatal to the batch: the
/// orchestrator records them and moves on to the next item.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    InputMalformed,
    SourceMissing,
    UnknownFormat,
    BibcodeUnresolved,
    UnpackFailed,
    NoMainFile,
    CompileTimeout,
    CompileOutputMissing,
    TextConversionFailed,
    NoReferencesFound,
    TooFewReferences,
    OutputIoError,
    WithdrawnItem,
    InternalInvariantViolated,
}

impl ErrorKind {
    /// A short, stable, lowercase token naming this kind, suitable for log
    /// lines and tests that want to match on failure category without
    /// depending on the exact wording of a message.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::InputMalformed => "input-malformed",
            ErrorKind::SourceMissing => "source-missing",
            ErrorKind::UnknownFormat => "unknown-format",
            ErrorKind::BibcodeUnresolved => "bibcode-unresolved",
            ErrorKind::UnpackFailed => "unpack-failed",
            ErrorKind::NoMainFile => "no-main-file",
            ErrorKind::CompileTimeout => "compile-timeout",
            ErrorKind::CompileOutputMissing => "compile-output-missing",
            ErrorKind::TextConversionFailed => "text-conversion-failed",
            ErrorKind::NoReferencesFound => "no-references-found",
            ErrorKind::TooFewReferences => "too-few-references",
            ErrorKind::OutputIoError => "output-io-error",
            ErrorKind::WithdrawnItem => "withdrawn-item",
            ErrorKind::InternalInvariantViolated => "internal-invariant-violated",
        }
    }
}

/// A single item's failure: a closed `kind` plus a human-readable message.
#[derive(Clone, Debug)]
pub struct ItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ItemError {
            kind,
            message: message.into(),
        }
    }

    pub fn too_few(n: usize) -> Self {
        ItemError::new(
            ErrorKind::TooFewReferences,
            format!("only {n} references found"),
        )
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.tag(), self.message)
    }
}

impl std::error::Error for ItemError {}

/// Any infrastructure-level error (I/O, subprocess plumbing, a broken
/// invariant deep in a helper) is conservatively folded into
/// [`ErrorKind::InternalInvariantViolated`] when it escapes to the top of
/// per-item processing without having already been mapped to something more
/// specific along the way.
impl From<DynError> for ItemError {
    fn from(e: DynError) -> Self {
        ItemError::new(ErrorKind::InternalInvariantViolated, e.to_string())
    }
}
