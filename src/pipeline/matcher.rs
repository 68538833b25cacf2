use std::collections::HashSet;

use crate::catalog::Query;
use crate::error::ScrapeError;

/// Where each declared column sits in a result set.
///
/// `values[i]` is the position of `query.values[i]`, `labels[i]` the
/// position of `query.labels[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub values: Vec<usize>,
    pub labels: Vec<usize>,
}

impl ColumnMapping {
    /// Total number of columns a row must have
    pub fn width(&self) -> usize {
        self.values.len() + self.labels.len()
    }
}

/// Resolve the query's value and label columns against the result columns.
///
/// Runs once per query, before any row is looked at. Value columns are
/// matched by name first; every remaining position is a label column and
/// must carry one of the declared label names.
pub fn match_columns(query: &Query, columns: &[String]) -> Result<ColumnMapping, ScrapeError> {
    let mut seen = HashSet::new();
    for value in &query.values {
        if !seen.insert(value.column.as_str()) {
            return Err(ScrapeError::DuplicateValueColumn {
                query: query.name.clone(),
                column: value.column.clone(),
            });
        }
    }

    if columns.len() != query.expected_width() {
        return Err(ScrapeError::ColumnCountMismatch {
            query: query.name.clone(),
            expected: query.expected_width(),
            actual: columns.len(),
        });
    }

    let mut taken = vec![false; columns.len()];

    let mut values = Vec::with_capacity(query.values.len());
    for value in &query.values {
        let position = columns
            .iter()
            .position(|c| *c == value.column)
            .ok_or_else(|| ScrapeError::ColumnNotFound {
                query: query.name.clone(),
                column: value.column.clone(),
            })?;
        taken[position] = true;
        values.push(position);
    }

    let mut labels = Vec::with_capacity(query.labels.len());
    for label in &query.labels {
        let position = (0..columns.len())
            .find(|&i| !taken[i] && columns[i] == *label)
            .ok_or_else(|| ScrapeError::LabelColumnNotFound {
                query: query.name.clone(),
                column: label.clone(),
            })?;
        taken[position] = true;
        labels.push(position);
    }

    Ok(ColumnMapping { values, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MetricKind, ValueSpec};

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn query(labels: &[&str], values: &[&str]) -> Query {
        Query {
            name: "q".to_string(),
            sql: "SELECT 1".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            values: values
                .iter()
                .map(|v| ValueSpec {
                    column: v.to_string(),
                    kind: MetricKind::Gauge,
                    help: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_positions_follow_result_order() {
        let q = query(&["db", "host"], &["size", "rows"]);
        let mapping = match_columns(&q, &cols(&["rows", "host", "size", "db"])).unwrap();

        assert_eq!(mapping.values, vec![2, 0]);
        assert_eq!(mapping.labels, vec![3, 1]);
        assert_eq!(mapping.width(), 4);
    }

    #[test]
    fn test_no_labels() {
        let q = query(&[], &["total"]);
        let mapping = match_columns(&q, &cols(&["total"])).unwrap();
        assert_eq!(mapping.values, vec![0]);
        assert!(mapping.labels.is_empty());
    }

    #[test]
    fn test_duplicate_value_column_regardless_of_result() {
        let q = query(&[], &["total", "total"]);
        for columns in [cols(&[]), cols(&["total", "total"]), cols(&["a", "b", "c"])] {
            let err = match_columns(&q, &columns).unwrap_err();
            assert!(matches!(err, ScrapeError::DuplicateValueColumn { .. }));
        }
    }

    #[test]
    fn test_column_count_mismatch() {
        let q = query(&["host"], &["cnt"]);
        let err = match_columns(&q, &cols(&["host", "cnt", "extra"])).unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::ColumnCountMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_value_column_not_found() {
        let q = query(&["host"], &["cnt"]);
        let err = match_columns(&q, &cols(&["host", "count"])).unwrap_err();
        assert!(matches!(err, ScrapeError::ColumnNotFound { ref column, .. } if column == "cnt"));
    }

    #[test]
    fn test_label_column_not_found() {
        let q = query(&["host"], &["cnt"]);
        let err = match_columns(&q, &cols(&["hostname", "cnt"])).unwrap_err();
        assert!(matches!(err, ScrapeError::LabelColumnNotFound { ref column, .. } if column == "host"));
    }
}
