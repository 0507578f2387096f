//! Process-lifetime cache of compiled regexes.
//!
//! The same title regexes and branch specs are evaluated for every webhook
//! delivery, so compiled patterns are kept for the life of the process, keyed
//! by their source text.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;

static CACHE: LazyLock<RwLock<HashMap<String, Arc<Regex>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Returns the compiled, full-string anchored form of `source`.
///
/// Compile failures are not cached; the caller decides how to report them.
///
/// # Errors
///
/// Returns the regex compile error if `source` is not a valid pattern.
pub fn cached_regex(source: &str) -> Result<Arc<Regex>, regex::Error> {
    if let Some(regex) = CACHE.read().get(source) {
        return Ok(Arc::clone(regex));
    }

    let compiled = Arc::new(Regex::new(&format!("^(?:{source})$"))?);
    let mut cache = CACHE.write();
    let entry = cache
        .entry(source.to_string())
        .or_insert_with(|| Arc::clone(&compiled));
    Ok(Arc::clone(entry))
}
