use crate::catalog::Query;
use crate::error::ScrapeError;
use crate::executor::Cell;

use super::matcher::ColumnMapping;
use super::snapshot::SnapshotRegistry;

/// Apply every row of a result set to the query's instruments.
///
/// Each row is split by `mapping` into its label tuple and its value
/// cells. Any malformed row fails the whole query; nothing is skipped.
/// Returns the number of rows applied.
pub fn project(
    query: &Query,
    mapping: &ColumnMapping,
    metric_names: &[String],
    rows: &[Vec<Cell>],
    registry: &SnapshotRegistry,
) -> Result<usize, ScrapeError> {
    let expected = mapping.width();

    for (index, row) in rows.iter().enumerate() {
        if row.len() != expected {
            return Err(ScrapeError::RowArityMismatch {
                query: query.name.clone(),
                row: index,
                expected,
                actual: row.len(),
            });
        }

        let label_values: Vec<String> = mapping.labels.iter().map(|&i| row[i].label_value()).collect();
        let label_refs: Vec<&str> = label_values.iter().map(String::as_str).collect();

        for ((value, &position), name) in query.values.iter().zip(&mapping.values).zip(metric_names) {
            let cell = &row[position];
            let number = cell.as_f64().ok_or_else(|| ScrapeError::NonNumericValue {
                query: query.name.clone(),
                column: value.column.clone(),
                value: cell.to_string(),
            })?;

            let instrument = registry
                .get(name)
                .ok_or_else(|| ScrapeError::Internal(format!("instrument '{}' is not registered", name)))?;
            instrument.apply(name, &label_refs, number)?;
        }
    }

    Ok(rows.len())
}
