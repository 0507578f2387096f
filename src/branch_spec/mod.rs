//! Branch specs: line-oriented include/exclude rules over git ref names.
//!
//! # Syntax
//!
//! One pattern per line. Blank lines and lines starting with `#` are ignored.
//!
//! | Prefix | Meaning |
//! |--------|---------|
//! | `+:`, `+`, none | include |
//! | `-:`, `^`, `-` | exclude |
//!
//! In wildcard mode `*` matches any sequence and `?` any single character;
//! everything else, `.` included, is literal. In regex mode each pattern is a
//! full-string anchored regex. A line consisting of a bare `*` makes the whole
//! spec match every ref, whatever else it contains.
//!
//! # Evaluation
//!
//! The text is trimmed of whitespace and surrounding `/`. It is then tested in
//! two forms, with the `refs/heads/` prefix removed and with it present, so
//! `main` and `refs/heads/main` are interchangeable on both sides. Excludes are
//! checked against both forms before any include is tried: a matching exclude
//! always wins, whatever the line order.

mod cache;
mod rule;

pub use cache::cached_regex;

use rule::{Line, Matcher, Polarity};

const HEADS_PREFIX: &str = "refs/heads/";

/// A compiled branch spec.
#[derive(Debug, Clone, Default)]
pub struct BranchSpec {
    match_all: bool,
    includes: Vec<Matcher>,
    excludes: Vec<Matcher>,
}

impl BranchSpec {
    /// Compiles a list of pattern lines.
    ///
    /// Malformed regex patterns are logged and skipped; they never fail the
    /// whole spec.
    pub fn compile<I, S>(patterns: I, is_regex: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut spec = BranchSpec::default();
        for line in patterns {
            match rule::parse_line(line.as_ref(), is_regex) {
                Line::Skip => {}
                Line::MatchAll => spec.match_all = true,
                Line::Rule(Polarity::Include, m) => spec.includes.push(m),
                Line::Rule(Polarity::Exclude, m) => spec.excludes.push(m),
            }
        }
        spec
    }

    /// Compiles a newline-separated spec as stored in trigger configuration.
    pub fn parse(text: &str, is_regex: bool) -> Self {
        Self::compile(text.lines(), is_regex)
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.match_all {
            return true;
        }

        let text = normalize(text);
        let alternate = match text.strip_prefix(HEADS_PREFIX) {
            Some(short) => normalize(short).to_string(),
            None => format!("{HEADS_PREFIX}{text}"),
        };
        let candidates = [text, alternate.as_str()];

        let any_match = |matchers: &[Matcher]| {
            matchers
                .iter()
                .any(|m| candidates.iter().any(|c| m.matches(c)))
        };

        if any_match(&self.excludes) {
            return false;
        }
        any_match(&self.includes)
    }
}

fn normalize(text: &str) -> &str {
    text.trim().trim_matches('/')
}
