use std::collections::BTreeSet;

const WILDCARD_PREFIX: &str = "*.";

/// Build the LIKE pattern matching every name under `domain`.
pub fn domain_pattern(domain: &str) -> String {
    format!("%.{}", domain)
}

/// Strip surrounding whitespace and a single leading wildcard label.
pub fn normalize_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix(WILDCARD_PREFIX).unwrap_or(trimmed)
}

/// Normalize raw common names into a sorted, deduplicated list that always
/// contains `domain` itself.
pub fn normalize_names<I, S>(domain: &str, raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names = BTreeSet::from([domain.to_string()]);
    for name in raw {
        let name = normalize_name(name.as_ref());
        if !name.is_empty() {
            names.insert(name.to_string());
        }
    }
    // BTreeSet<String> iterates in byte-wise order
    names.into_iter().collect()
}
