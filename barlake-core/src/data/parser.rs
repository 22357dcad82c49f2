//! Line parser: raw text lines → validated bars.
//!
//! Malformed rows are common in legacy fixed-format feeds, so corruption is
//! isolated per line. A bad line is skipped and counted; the counts for one
//! source reach the [`DiagnosticsSink`] as a single summary once all lines
//! have been consumed.

use super::diagnostics::{DiagnosticsSink, SkipReason, SkipSummary};
use crate::domain::bar::{Bar, BASE_FIELD_COUNT, FULL_FIELD_COUNT};
use std::iter::FusedIterator;

/// Header marker recognised at the start of a line (case-insensitive).
pub const HEADER_MARKER: &str = "<ticker>";

const BOM: char = '\u{feff}';

/// What a single line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Bar(Bar),
    /// Expected structure, skipped without being counted.
    Header,
    Skipped(SkipReason),
}

/// The "line → record or skip" capability.
pub trait BarParser: Send + Sync {
    /// Classify one raw line.
    fn parse_line(&self, line: &str) -> LineOutcome;

    /// Lazily parse `lines`, tagging diagnostics with `source_name`.
    ///
    /// The returned iterator is single-pass. When it is exhausted it reports
    /// one [`SkipSummary`] to `sink` if anything was skipped.
    fn parse<'a, I>(
        &'a self,
        lines: I,
        source_name: &'a str,
        sink: &'a dyn DiagnosticsSink,
    ) -> ParsedBars<'a, Self, I::IntoIter>
    where
        Self: Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        ParsedBars {
            parser: self,
            lines: lines.into_iter(),
            summary: SkipSummary::new(source_name),
            sink,
            finished: false,
        }
    }
}

/// Parser for `.mst` style delimited bar files.
#[derive(Debug, Clone)]
pub struct MstBarParser {
    pub delimiter: char,
    pub has_header: bool,
}

impl MstBarParser {
    pub fn new(delimiter: char, has_header: bool) -> Self {
        Self {
            delimiter,
            has_header,
        }
    }

    fn is_header(&self, line: &str) -> bool {
        self.has_header
            && line
                .get(..HEADER_MARKER.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(HEADER_MARKER))
    }
}

impl Default for MstBarParser {
    fn default() -> Self {
        Self::new(',', false)
    }
}

impl BarParser for MstBarParser {
    fn parse_line(&self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Skipped(SkipReason::Empty);
        }

        let line = line.trim_start_matches(BOM);
        if self.is_header(line) {
            return LineOutcome::Header;
        }

        let fields: Vec<&str> = line.split(self.delimiter).map(str::trim).collect();
        if fields.len() != BASE_FIELD_COUNT && fields.len() != FULL_FIELD_COUNT {
            return LineOutcome::Skipped(SkipReason::BadColumnCount);
        }

        match Bar::from_fields(&fields) {
            Ok(bar) => LineOutcome::Bar(bar),
            Err(_) => LineOutcome::Skipped(SkipReason::Other),
        }
    }
}

/// Lazy iterator returned by [`BarParser::parse`].
pub struct ParsedBars<'a, P: ?Sized, I> {
    parser: &'a P,
    lines: I,
    summary: SkipSummary,
    sink: &'a dyn DiagnosticsSink,
    finished: bool,
}

impl<P: ?Sized, I> ParsedBars<'_, P, I> {
    /// Skip counts accumulated so far.
    pub fn summary(&self) -> &SkipSummary {
        &self.summary
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if !self.summary.is_clean() {
            self.sink.skipped_rows(&self.summary);
        }
    }
}

impl<P, I> Iterator for ParsedBars<'_, P, I>
where
    P: BarParser + ?Sized,
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        if self.finished {
            return None;
        }

        for line in self.lines.by_ref() {
            match self.parser.parse_line(line.as_ref()) {
                LineOutcome::Bar(bar) => return Some(bar),
                LineOutcome::Header => {}
                LineOutcome::Skipped(reason) => self.summary.record(reason),
            }
        }

        self.finish();
        None
    }
}

impl<P, I> FusedIterator for ParsedBars<'_, P, I>
where
    P: BarParser + ?Sized,
    I: Iterator,
    I::Item: AsRef<str>,
{
}

/// Splits text into lines on `\n`, `\r\n` or a lone `\r`.
///
/// Line breaks are not included, and a trailing break does not produce a
/// final empty line.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(['\n', '\r']) {
            Some(i) => {
                let line = &rest[..i];
                let width = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[i + width..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}
