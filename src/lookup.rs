//! The single query, normalize, print cycle.

use std::io::{BufWriter, Write};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::error::LookupError;
use crate::search;

/// Anything that can answer a common-name suffix query
#[allow(async_fn_in_trait)]
pub trait NameSource {
    /// Return the raw names matching a LIKE `pattern`
    async fn fetch_names(&mut self, pattern: &str) -> Result<Vec<String>, LookupError>;
}

/// Query `source` for names under `domain` and normalize the result.
///
/// An empty domain is a no-op and yields no names.
pub async fn lookup<S: NameSource>(
    source: &mut S,
    domain: &str,
    timeout: Duration,
) -> Result<Vec<String>, LookupError> {
    if domain.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = search::domain_pattern(domain);
    let raw = tokio::time::timeout(timeout, source.fetch_names(&pattern))
        .await
        .map_err(|_| LookupError::Timeout(timeout))??;

    let names = search::normalize_names(domain, &raw);
    info!(domain, raw = raw.len(), names = names.len(), "lookup finished");
    Ok(names)
}

/// Write one name per line, flushing once at the end.
pub fn write_names<W: Write>(writer: W, names: &[String]) -> Result<()> {
    let mut out = BufWriter::new(writer);
    for name in names {
        writeln!(out, "{}", name)?;
    }
    out.flush()?;
    Ok(())
}
