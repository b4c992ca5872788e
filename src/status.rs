// Copyright 2024 the Tectonic Project
// Licensed under the MIT License

//! Diagnostic reporting.
//!
//! The orchestrator and batch driver report progress and failures through
//! the [`StatusBackend`] trait from `tectonic_status_base`. Here it is
//! specialized to prefix every message with the item path that produced
//! it, so that a batch run's stderr output can be grepped per item even
//! though processing is strictly sequential.

use std::io::Write;
use tectonic_errors::Error;
use tectonic_status_base::{MessageKind, StatusBackend};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// A `StatusBackend` that writes colorized lines to stderr via `termcolor`,
/// each one prefixed with the path of the item currently being processed.
pub struct ItemStatusBackend {
    item_path: String,
    stream: StandardStream,
}

impl ItemStatusBackend {
    pub fn new(item_path: impl Into<String>) -> Self {
        ItemStatusBackend {
            item_path: item_path.into(),
            stream: StandardStream::stderr(ColorChoice::Auto),
        }
    }

    pub fn set_item(&mut self, item_path: impl Into<String>) {
        self.item_path = item_path.into();
    }

    fn label_color(kind: MessageKind) -> (&'static str, Color) {
        match kind {
            MessageKind::Note => ("note", Color::Green),
            MessageKind::Warning => ("warning", Color::Yellow),
            MessageKind::Error => ("error", Color::Red),
        }
    }
}

impl StatusBackend for ItemStatusBackend {
    fn report(&mut self, kind: MessageKind, args: std::fmt::Arguments<'_>, err: Option<&Error>) {
        let (label, color) = Self::label_color(kind);

        let _ = write!(self.stream, "{}: ", self.item_path);
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(self.stream, "{label}");
        let _ = self.stream.reset();
        let _ = writeln!(self.stream, ": {args}");

        if let Some(e) = err {
            for cause in e.chain() {
                let _ = writeln!(self.stream, "{}:   caused by: {}", self.item_path, cause);
            }
        }
    }

    fn dump_error_logs(&mut self, output: &[u8]) {
        let (_, color) = Self::label_color(MessageKind::Error);
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = writeln!(
            self.stream,
            "{}: error: --- begin captured tool output ---",
            self.item_path
        );
        let _ = self.stream.reset();
        let _ = writeln!(self.stream, "{}", String::from_utf8_lossy(output));
        let _ = self
            .stream
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = writeln!(
            self.stream,
            "{}: error: --- end captured tool output ---",
            self.item_path
        );
        let _ = self.stream.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tectonic_status_base::tt_note;

    #[test]
    fn set_item_changes_prefix() {
        let mut s = ItemStatusBackend::new("arXiv/2111/03186");
        assert_eq!(s.item_path, "arXiv/2111/03186");
        s.set_item("arXiv/1904/09850");
        assert_eq!(s.item_path, "arXiv/1904/09850");
        tt_note!(s, "just checking this compiles and doesn't panic");
    }
}
