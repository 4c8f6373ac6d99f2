use std::collections::HashMap;
use std::sync::Arc;

use super::row::{DbRow, index_columns};
use crate::types::RowValues;

/// Rows produced by one statement, in the order the database returned them.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub rows: Vec<DbRow>,
    /// Number of rows returned (for queries) or affected (for DML)
    pub rows_affected: usize,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_columns(column_names: Vec<String>, capacity: usize) -> ResultSet {
        let column_index = Arc::new(index_columns(&column_names));
        ResultSet {
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
            column_names: Arc::new(column_names),
            column_index,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.rows.push(DbRow::with_index(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        ));
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What `read` hands back: one optional record for row-limited statements, every record otherwise.
#[derive(Debug, Clone)]
pub enum ReadResult {
    One(Option<DbRow>),
    Many(Vec<DbRow>),
}

impl ReadResult {
    #[must_use]
    pub fn into_one(self) -> Option<DbRow> {
        match self {
            ReadResult::One(row) => row,
            ReadResult::Many(rows) => rows.into_iter().next(),
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<DbRow> {
        match self {
            ReadResult::One(row) => row.into_iter().collect(),
            ReadResult::Many(rows) => rows,
        }
    }

    #[must_use]
    pub fn is_single(&self) -> bool {
        matches!(self, ReadResult::One(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_columns() {
        let mut rs = ResultSet::with_columns(vec!["a".into(), "b".into()], 2);
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Null]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("x".into())]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert_eq!(rs.rows[1].get("b").and_then(RowValues::as_text), Some("x"));
        assert!(rs.rows[0].get("b").is_some_and(RowValues::is_null));
    }

    #[test]
    fn read_result_conversions() {
        let one = ReadResult::One(None);
        assert!(one.is_single());
        assert!(one.into_rows().is_empty());

        let mut rs = ResultSet::with_columns(vec!["a".into()], 1);
        rs.add_row_values(vec![RowValues::Int(5)]);
        let many = ReadResult::Many(rs.rows);
        let first = many.into_one().expect("row");
        assert_eq!(first.get("a").and_then(RowValues::as_int), Some(5));
    }
}
