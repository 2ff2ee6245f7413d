//! Generic filter specification builder
//!
//! ## Responsibilities
//!
//! - Translate (column, operation, value) triples into SQL predicates
//!   against an entity's registered column allow-list
//! - Page metadata for filter responses
//!
//! Each filterable entity registers a static table of
//! `(api column name, SQL column)` pairs. Criteria naming a column that
//! is not on the list are skipped without error, matching the original
//! contract. Only the first element of a criterion's value list is
//! consulted.

use serde::Deserialize;

use crate::models::PageDetail;

/// Default page size when the request omits `limit`
pub const DEFAULT_LIMIT: u32 = 10;

/// Allow-list of filterable columns: `(api name, SQL column)`
pub type ColumnMap = &'static [(&'static str, &'static str)];

/// Supported filter operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperation {
    /// Case-insensitive substring containment
    Include,
    /// Exact equality against the stored representation
    Equal,
}

impl FilterOperation {
    /// Unknown operation names yield `None`; the criterion is then
    /// skipped rather than failing the request.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Include" => Some(FilterOperation::Include),
            "Equal" => Some(FilterOperation::Equal),
            _ => None,
        }
    }

    /// Reference semantics of each operation, used by tests and kept in
    /// sync with the SQL rendering below.
    pub fn matches(&self, stored: &str, needle: &str) -> bool {
        match self {
            FilterOperation::Include => stored.to_lowercase().contains(&needle.to_lowercase()),
            FilterOperation::Equal => stored == needle,
        }
    }
}

/// One column/operation/value constraint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriterion {
    pub column_name: String,
    pub operation: String,
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
}

/// Filter + pagination request for list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    #[serde(default)]
    pub filter_values: Vec<FilterCriterion>,
    /// 0-based page number
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl FilterRequest {
    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn limit(&self) -> u32 {
        match self.limit {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_LIMIT,
        }
    }

    /// Row offset for the SQL `OFFSET` clause
    pub fn row_offset(&self) -> u64 {
        u64::from(self.offset()) * u64::from(self.limit())
    }
}

/// AND-combined SQL predicate with positional binds
#[derive(Debug, Default)]
pub struct SqlFilter {
    pub clauses: Vec<String>,
    pub binds: Vec<String>,
}

impl SqlFilter {
    /// ` WHERE a AND b` fragment, or empty when no criteria survived
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Build the SQL predicate for a request against an entity's column
/// allow-list. Degrades to "no constraint" on any malformed criterion:
/// unknown column, unknown operation, or empty/null value list.
pub fn build_sql_filter(request: &FilterRequest, columns: ColumnMap) -> SqlFilter {
    let mut filter = SqlFilter::default();

    for criterion in &request.filter_values {
        let Some((_, sql_column)) = columns
            .iter()
            .find(|(api_name, _)| *api_name == criterion.column_name)
        else {
            continue;
        };

        let Some(operation) = FilterOperation::parse(&criterion.operation) else {
            continue;
        };

        // Only the first value is consulted; extras are ignored.
        let Some(value) = criterion.value.first().and_then(scalar_to_string) else {
            continue;
        };

        match operation {
            FilterOperation::Include => {
                filter
                    .clauses
                    .push(format!("LOWER({}) LIKE ?", sql_column));
                filter
                    .binds
                    .push(format!("%{}%", escape_like(&value.to_lowercase())));
            }
            FilterOperation::Equal => {
                filter.clauses.push(format!("{} = ?", sql_column));
                filter.binds.push(value);
            }
        }
    }

    filter
}

/// Stored-representation string for a scalar filter value
fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Escape LIKE wildcards so filter values match literally
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Page metadata from the pre-pagination total and the returned slice
pub fn page_detail(total_records: i64, offset: u32, returned: usize) -> PageDetail {
    PageDetail {
        total_records,
        page_number: offset + 1,
        page_element_count: returned as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: ColumnMap = &[
        ("transformerNo", "transformer_no"),
        ("region", "region"),
        ("poleNo", "pole_no"),
    ];

    fn criterion(column: &str, operation: &str, values: Vec<serde_json::Value>) -> FilterCriterion {
        FilterCriterion {
            column_name: column.to_string(),
            operation: operation.to_string(),
            value: values,
        }
    }

    fn request(criteria: Vec<FilterCriterion>) -> FilterRequest {
        FilterRequest {
            filter_values: criteria,
            offset: None,
            limit: None,
        }
    }

    #[test]
    fn test_include_is_case_insensitive_substring() {
        assert!(FilterOperation::Include.matches("TX100", "tx1"));
        assert!(FilterOperation::Include.matches("tx100", "TX1"));
        assert!(!FilterOperation::Include.matches("TX100", "tx2"));
    }

    #[test]
    fn test_equal_is_exact_as_stored() {
        assert!(FilterOperation::Equal.matches("TX100", "TX100"));
        assert!(!FilterOperation::Equal.matches("TX100", "tx100"));
        assert!(!FilterOperation::Equal.matches("TX100", "TX10"));
    }

    #[test]
    fn test_unknown_operation_parses_to_none() {
        assert_eq!(FilterOperation::parse("Include"), Some(FilterOperation::Include));
        assert_eq!(FilterOperation::parse("Equal"), Some(FilterOperation::Equal));
        assert_eq!(FilterOperation::parse("GreaterThan"), None);
        assert_eq!(FilterOperation::parse(""), None);
    }

    #[test]
    fn test_unknown_column_is_skipped() {
        let with_unknown = build_sql_filter(
            &request(vec![
                criterion("region", "Equal", vec![json!("North")]),
                criterion("noSuchColumn", "Equal", vec![json!("x")]),
            ]),
            COLUMNS,
        );
        let without = build_sql_filter(
            &request(vec![criterion("region", "Equal", vec![json!("North")])]),
            COLUMNS,
        );
        assert_eq!(with_unknown.clauses, without.clauses);
        assert_eq!(with_unknown.binds, without.binds);
    }

    #[test]
    fn test_include_renders_lowered_like() {
        let filter = build_sql_filter(
            &request(vec![criterion("transformerNo", "Include", vec![json!("Tx1")])]),
            COLUMNS,
        );
        assert_eq!(filter.clauses, vec!["LOWER(transformer_no) LIKE ?"]);
        assert_eq!(filter.binds, vec!["%tx1%"]);
    }

    #[test]
    fn test_equal_renders_plain_equality() {
        let filter = build_sql_filter(
            &request(vec![criterion("poleNo", "Equal", vec![json!("P-7")])]),
            COLUMNS,
        );
        assert_eq!(filter.clauses, vec!["pole_no = ?"]);
        assert_eq!(filter.binds, vec!["P-7"]);
        assert_eq!(filter.where_sql(), " WHERE pole_no = ?");
    }

    #[test]
    fn test_only_first_value_is_consulted() {
        let filter = build_sql_filter(
            &request(vec![criterion(
                "region",
                "Equal",
                vec![json!("North"), json!("South")],
            )]),
            COLUMNS,
        );
        assert_eq!(filter.binds, vec!["North"]);
    }

    #[test]
    fn test_empty_or_null_values_skip_criterion() {
        let filter = build_sql_filter(
            &request(vec![
                criterion("region", "Equal", vec![]),
                criterion("poleNo", "Include", vec![json!(null)]),
            ]),
            COLUMNS,
        );
        assert!(filter.clauses.is_empty());
        assert_eq!(filter.where_sql(), "");
    }

    #[test]
    fn test_criteria_are_and_combined() {
        let filter = build_sql_filter(
            &request(vec![
                criterion("region", "Equal", vec![json!("North")]),
                criterion("transformerNo", "Include", vec![json!("tx")]),
            ]),
            COLUMNS,
        );
        assert_eq!(
            filter.where_sql(),
            " WHERE region = ? AND LOWER(transformer_no) LIKE ?"
        );
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let filter = build_sql_filter(
            &request(vec![criterion(
                "transformerNo",
                "Include",
                vec![json!("50%_done")],
            )]),
            COLUMNS,
        );
        assert_eq!(filter.binds, vec!["%50\\%\\_done%"]);
    }

    #[test]
    fn test_numeric_value_uses_stored_representation() {
        let filter = build_sql_filter(
            &request(vec![criterion("poleNo", "Equal", vec![json!(42)])]),
            COLUMNS,
        );
        assert_eq!(filter.binds, vec!["42"]);
    }

    #[test]
    fn test_defaults_offset_zero_limit_ten() {
        let request = FilterRequest::default();
        assert_eq!(request.offset(), 0);
        assert_eq!(request.limit(), DEFAULT_LIMIT);
        assert_eq!(request.row_offset(), 0);
    }

    #[test]
    fn test_zero_limit_falls_back_to_default() {
        let request = FilterRequest {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(request.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_row_offset_is_page_times_limit() {
        let request = FilterRequest {
            offset: Some(2),
            limit: Some(10),
            ..Default::default()
        };
        assert_eq!(request.row_offset(), 20);
    }

    #[test]
    fn test_page_detail_first_page() {
        // 25 matches, limit 10, offset 0
        let detail = page_detail(25, 0, 10);
        assert_eq!(detail.total_records, 25);
        assert_eq!(detail.page_number, 1);
        assert_eq!(detail.page_element_count, 10);
    }

    #[test]
    fn test_page_detail_last_partial_page() {
        // 25 matches, limit 10, offset 2
        let detail = page_detail(25, 2, 5);
        assert_eq!(detail.page_number, 3);
        assert_eq!(detail.page_element_count, 5);
    }

    #[test]
    fn test_criterion_deserializes_camel_case() {
        let request: FilterRequest = serde_json::from_str(
            r#"{"filterValues":[{"columnName":"transformerNo","operation":"Include","value":["tx1"]}],"offset":1,"limit":5}"#,
        )
        .unwrap();
        assert_eq!(request.filter_values.len(), 1);
        assert_eq!(request.filter_values[0].column_name, "transformerNo");
        assert_eq!(request.offset(), 1);
        assert_eq!(request.limit(), 5);
    }
}
