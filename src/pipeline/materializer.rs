use crate::catalog::Query;
use crate::error::ScrapeError;

use super::snapshot::SnapshotRegistry;

/// Register one instrument per value column of `query`.
///
/// Instruments are named `{query}_{column}` and carry the query's declared
/// label names. Returns the names in value-column order.
pub fn materialize(query: &Query, registry: &mut SnapshotRegistry) -> Result<Vec<String>, ScrapeError> {
    let labels: Vec<&str> = query.labels.iter().map(String::as_str).collect();

    let mut names = Vec::with_capacity(query.values.len());
    for value in &query.values {
        let name = query.metric_name(value);
        // The text format requires a help line
        let help = if value.help.trim().is_empty() {
            name.as_str()
        } else {
            value.help.as_str()
        };
        registry.register(&name, value.kind, help, &labels)?;
        names.push(name);
    }

    Ok(names)
}
