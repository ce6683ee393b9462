//! Flat text payloads: `key=value` pairs joined by `SEPARATOR`.
//!
//! Lookup is a raw substring search for `key=`. A key that also appears as the
//! tail of another key or inside an earlier value will match there first;
//! callers pick keys and values so that cannot happen.

pub const SEPARATOR: &str = "|---|";

/// Join `key=value` pairs. Pairs with an empty key or value are skipped.
pub fn build_payload(fields: &[(&str, &str)]) -> String {
    let mut payload = String::new();
    for (key, value) in fields {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        if !payload.is_empty() {
            payload.push_str(SEPARATOR);
        }
        payload.push_str(key);
        payload.push('=');
        payload.push_str(value);
    }
    payload
}

/// Value of the first `key=` in `source`, trimmed. `None` if missing or empty.
pub fn get_field<'a>(source: &'a str, key: &str) -> Option<&'a str> {
    if key.is_empty() {
        return None;
    }
    let marker = format!("{key}=");
    let start = source.find(&marker)? + marker.len();
    let rest = &source[start..];
    let end = rest.find(SEPARATOR).unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
