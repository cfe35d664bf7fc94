//! URL normalisation for extracted fields.

use crate::model::{is_url_field, Record};
use reqwest::Url;
use tracing::debug;

/// True if `value` starts with a URI scheme (`scheme:`), e.g. `https:`, `mailto:`, `data:`.
pub fn is_absolute(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve `value` against `base`. Absolute values come back unchanged, byte for byte.
pub fn resolve(base: &Url, value: &str) -> Option<String> {
    if is_absolute(value) {
        return Some(value.to_string());
    }
    base.join(value).ok().map(String::from)
}

/// Resolve every non-null URL field of `record` against `base`.
///
/// A value that cannot be joined is left as extracted.
pub fn normalize_record(record: &mut Record, base: &Url) {
    for (name, value) in record.iter_mut() {
        if !is_url_field(name) {
            continue;
        }
        let Some(raw) = value.as_deref() else {
            continue;
        };
        if is_absolute(raw) {
            continue;
        }
        match base.join(raw) {
            Ok(url) => *value = Some(url.into()),
            Err(e) => debug!(field = name, value = raw, error = %e, "Could not resolve URL field"),
        }
    }
}
