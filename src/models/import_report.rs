//! Report returned by a bulk CSV import run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What happened to one table during the run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TableOutcome {
    Imported { count: usize },
    Failed { error: String },
}

impl TableOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TableOutcome::Failed { .. })
    }
}

/// Per-table outcomes, in import order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    #[schema(value_type = Object)]
    pub tables: IndexMap<String, TableOutcome>,
}

impl ImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: impl Into<String>, outcome: TableOutcome) {
        self.tables.insert(table.into(), outcome);
    }

    pub fn get(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.get(table)
    }

    /// Count for a successfully imported table
    pub fn imported(&self, table: &str) -> Option<usize> {
        match self.tables.get(table) {
            Some(TableOutcome::Imported { count }) => Some(*count),
            _ => None,
        }
    }

    pub fn total_imported(&self) -> usize {
        self.tables
            .values()
            .map(|outcome| match outcome {
                TableOutcome::Imported { count } => *count,
                TableOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().filter_map(|(table, outcome)| match outcome {
            TableOutcome::Failed { error } => Some((table.as_str(), error.as_str())),
            TableOutcome::Imported { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_keeps_insertion_order_and_totals() {
        let mut report = ImportReport::new();
        report.record("author", TableOutcome::Imported { count: 2 });
        report.record("books", TableOutcome::Failed { error: "boom".into() });
        report.record("rating", TableOutcome::Imported { count: 3 });

        let order: Vec<&str> = report.tables.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["author", "books", "rating"]);
        assert_eq!(report.total_imported(), 5);
        assert_eq!(report.failures().collect::<Vec<_>>(), vec![("books", "boom")]);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(TableOutcome::Imported { count: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "imported", "count": 4}));
    }
}
