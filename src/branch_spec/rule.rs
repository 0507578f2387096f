//! Parsing of single branch spec lines into include/exclude rules.

use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use super::cache::cached_regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Polarity {
    Include,
    Exclude,
}

/// How one pattern is tested against a branch name.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    Exact(String),
    Prefix(String),
    Regex(Arc<Regex>),
    /// A pattern that failed to compile. Matches nothing.
    Nothing,
}

impl Matcher {
    pub(crate) fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Exact(s) => text == s,
            Matcher::Prefix(p) => text.starts_with(p.as_str()),
            Matcher::Regex(r) => r.is_match(text),
            Matcher::Nothing => false,
        }
    }
}

/// One parsed line of a branch spec.
#[derive(Debug, Clone)]
pub(crate) enum Line {
    /// Blank line or `#` comment.
    Skip,
    /// A bare `*`: the whole spec matches everything.
    MatchAll,
    Rule(Polarity, Matcher),
}

pub(crate) fn parse_line(line: &str, is_regex: bool) -> Line {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Line::Skip;
    }
    if line == "*" {
        return Line::MatchAll;
    }

    let (polarity, pattern) = split_polarity(line);
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Line::Skip;
    }

    let matcher = if is_regex {
        regex_matcher(pattern)
    } else {
        wildcard_matcher(pattern)
    };
    Line::Rule(polarity, matcher)
}

fn split_polarity(line: &str) -> (Polarity, &str) {
    for (prefix, polarity) in [
        ("-:", Polarity::Exclude),
        ("+:", Polarity::Include),
        ("^", Polarity::Exclude),
        ("-", Polarity::Exclude),
        ("+", Polarity::Include),
    ] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return (polarity, rest);
        }
    }
    (Polarity::Include, line)
}

fn regex_matcher(pattern: &str) -> Matcher {
    match cached_regex(pattern) {
        Ok(regex) => Matcher::Regex(regex),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Skipping malformed branch spec regex");
            Matcher::Nothing
        }
    }
}

fn wildcard_matcher(pattern: &str) -> Matcher {
    let stars = pattern.matches('*').count();
    let has_question = pattern.contains('?');

    if stars == 0 && !has_question {
        return Matcher::Exact(pattern.to_string());
    }
    if stars == 1 && !has_question && let Some(prefix) = pattern.strip_suffix('*') {
        return Matcher::Prefix(prefix.to_string());
    }

    let mut source = String::with_capacity(pattern.len() * 2);
    let mut buf = [0; 4];
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    regex_matcher(&source)
}
