//! Input rows and the per-row expansion driver

use std::io;

use serde_json::{Map, Value as JsonValue, json};

use super::context::ExpressionContext;
use super::expander::TemplateExpander;
use crate::error::{ExpandError, RowError};

/// One unit of input driving one expansion
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Tabular line: column name to value, in header order. `None` is a missing value.
    Columns(Vec<(String, Option<String>)>),
    /// A JSON object
    Object(Map<String, JsonValue>),
}

impl Row {
    /// Snapshot of the row for failure reports
    pub fn to_json(&self) -> JsonValue {
        match self {
            Row::Columns(columns) => JsonValue::Object(
                columns
                    .iter()
                    .map(|(name, value)| {
                        let value = value.clone().map(JsonValue::String).unwrap_or(JsonValue::Null);
                        (name.clone(), value)
                    })
                    .collect(),
            ),
            Row::Object(fields) => JsonValue::Object(fields.clone()),
        }
    }

    /// Line number of the `index`th row (0-based) in its source.
    /// Tabular sources count the header as line 1.
    fn line_number(&self, index: usize) -> usize {
        match self {
            Row::Columns(_) => index + 2,
            Row::Object(_) => index + 1,
        }
    }
}

/// Read delimited rows with a header line
pub fn read_csv_rows<R: io::Read>(reader: R) -> Result<Vec<Row>, RowError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();

    for record in rdr.records() {
        let record = record?;
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), record.get(i).map(str::to_string)))
            .collect();
        rows.push(Row::Columns(columns));
    }

    log::debug!("Read {} CSV rows with {} columns", rows.len(), headers.len());
    Ok(rows)
}

pub fn parse_csv_rows(content: &str) -> Result<Vec<Row>, RowError> {
    read_csv_rows(content.as_bytes())
}

/// Parse a JSON array of objects, or a single object, into rows
pub fn parse_json_rows(content: &str) -> Result<Vec<Row>, RowError> {
    let parsed: JsonValue = serde_json::from_str(content)?;
    let items = match parsed {
        JsonValue::Array(items) => items,
        single => vec![single],
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            JsonValue::Object(fields) => Ok(Row::Object(fields)),
            other => Err(RowError::NotAnObject {
                index,
                found: other.to_string(),
            }),
        })
        .collect()
}

/// Outcome of expanding the template for one row
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionResult {
    pub line_number: usize,
    pub row: Row,
    /// Expanded document (`None` when it collapsed to nothing) or the row's failure
    pub outcome: Result<Option<JsonValue>, ExpandError>,
}

impl ExpansionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn expanded(&self) -> Option<&JsonValue> {
        self.outcome.as_ref().ok().and_then(Option::as_ref)
    }

    pub fn error(&self) -> Option<&ExpandError> {
        self.outcome.as_ref().err()
    }

    /// `{"line": n, "row": {...}, "error": "..."}` for a failed row
    pub fn to_failure_json(&self) -> Option<JsonValue> {
        self.error().map(|err| {
            json!({
                "line": self.line_number,
                "row": self.row.to_json(),
                "error": err.to_string(),
            })
        })
    }
}

/// Iterator expanding a template for each row in order.
/// A failed row is reported and the next row proceeds.
pub struct RowExpansion<'a, I> {
    expander: &'a TemplateExpander,
    ctx: &'a mut ExpressionContext,
    rows: I,
    index: usize,
    failed: usize,
}

impl<'a, I> RowExpansion<'a, I>
where
    I: Iterator<Item = Row>,
{
    pub fn new(expander: &'a TemplateExpander, ctx: &'a mut ExpressionContext, rows: I) -> Self {
        Self {
            expander,
            ctx,
            rows,
            index: 0,
            failed: 0,
        }
    }
}

impl<I> Iterator for RowExpansion<'_, I>
where
    I: Iterator<Item = Row>,
{
    type Item = ExpansionResult;

    fn next(&mut self) -> Option<ExpansionResult> {
        let Some(row) = self.rows.next() else {
            if self.index > 0 {
                log::info!(
                    "Expanded {} rows: {} succeeded, {} failed",
                    self.index,
                    self.index - self.failed,
                    self.failed
                );
            }
            return None;
        };

        let line_number = row.line_number(self.index);
        self.index += 1;

        self.ctx.load_row(&row);
        let outcome = self.expander.expand(self.ctx);

        if let Err(err) = &outcome {
            self.failed += 1;
            log::warn!("Line {} failed: {}", line_number, err);
        }

        Some(ExpansionResult {
            line_number,
            row,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpanderConfig;

    #[test]
    fn test_parse_csv_rows() {
        let rows = parse_csv_rows("name,Carrier/Client,TP#\nalice,ACME,7\nbob,,\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            Row::Columns(vec![
                ("name".to_string(), Some("alice".to_string())),
                ("Carrier/Client".to_string(), Some("ACME".to_string())),
                ("TP#".to_string(), Some("7".to_string())),
            ])
        );
    }

    #[test]
    fn test_short_csv_record_has_missing_columns() {
        let rows = parse_csv_rows("a,b\n1\n").unwrap();
        assert_eq!(
            rows[0].to_json(),
            json!({"a": "1", "b": null})
        );
    }

    #[test]
    fn test_parse_json_rows() {
        let rows = parse_json_rows(r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(parse_json_rows(r#"{"a": 1}"#).unwrap().len(), 1);

        let err = parse_json_rows(r#"[{"a": 1}, 5]"#).unwrap_err();
        assert!(matches!(err, RowError::NotAnObject { index: 1, .. }));
        assert!(matches!(parse_json_rows("[").unwrap_err(), RowError::Json(_)));
    }

    #[test]
    fn test_rows_are_isolated() {
        let expander = TemplateExpander::new(json!({"a": "${a}", "b": "${b}"}));
        let rows = parse_csv_rows("a,b\n1,2\n3\n").unwrap();
        let mut ctx = ExpressionContext::new();
        let results: Vec<_> = expander.expand_rows(&mut ctx, rows).collect();

        assert_eq!(results[0].expanded(), Some(&json!({"a": "1", "b": "2"})));
        assert_eq!(results[1].expanded(), Some(&json!({"a": "3"})));
    }

    #[test]
    fn test_var_bindings_do_not_leak() {
        let expander = TemplateExpander::new(json!([
            "${seen}",
            {"${if:a == '1'}": [{"${var seen}": "yes"}]},
            "end"
        ]));
        let rows = parse_csv_rows("a\n1\n2\n").unwrap();
        let mut ctx = ExpressionContext::new();
        let results: Vec<_> = expander.expand_rows(&mut ctx, rows).collect();

        assert_eq!(results[0].expanded(), Some(&json!(["end"])));
        assert_eq!(results[1].expanded(), Some(&json!(["end"])));
    }

    #[test]
    fn test_failed_row_does_not_stop_batch() {
        let expander = TemplateExpander::new(json!({
            "${if:name == 'bad'}": {"${error}": "rejected ${name}"},
            "name": "${name}"
        }));
        let rows = parse_csv_rows("name\ngood\nbad\nalso good\n").unwrap();
        let mut ctx = ExpressionContext::new();
        let results: Vec<_> = expander.expand_rows(&mut ctx, rows).collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        assert_eq!(results[2].expanded(), Some(&json!({"name": "also good"})));

        assert_eq!(
            results[1].to_failure_json(),
            Some(json!({"line": 3, "row": {"name": "bad"}, "error": "rejected bad"}))
        );
        assert_eq!(results[0].to_failure_json(), None);
    }

    #[test]
    fn test_row_fields_only_shadow_reserved_bindings() {
        let config = ExpanderConfig::from_toml(
            "timestamp = \"2024-06-01T09:15:00Z\"\n[reserved]\nregion = \"eu\"\n",
        )
        .unwrap();
        let expander = TemplateExpander::new(json!({"region": "${region}", "now": "${now}"}));
        let rows = parse_json_rows(r#"[{"region": "us", "now": "x"}, {}]"#).unwrap();
        let mut ctx = ExpressionContext::with_config(&config);
        let results: Vec<_> = expander.expand_rows(&mut ctx, rows).collect();

        assert_eq!(results[0].expanded(), Some(&json!({"region": "us", "now": "x"})));
        assert_eq!(
            results[1].expanded(),
            Some(&json!({"region": "eu", "now": "2024-06-01T09:15:00+00:00"}))
        );
    }

    #[test]
    fn test_var_shadows_reserved_binding_for_one_row() {
        let expander = TemplateExpander::new(json!([
            {"${if:flag == '1'}": [{"${var now}": "overwritten"}]},
            "${now}"
        ]));
        let config = ExpanderConfig::from_toml("timestamp = \"2024-06-01T09:15:00Z\"").unwrap();
        let mut ctx = ExpressionContext::with_config(&config);
        let rows = parse_csv_rows("flag\n1\n0\n").unwrap();
        let results: Vec<_> = expander.expand_rows(&mut ctx, rows).collect();

        assert_eq!(results[0].expanded(), Some(&json!(["overwritten"])));
        assert_eq!(results[1].expanded(), Some(&json!(["2024-06-01T09:15:00+00:00"])));
    }

    #[test]
    fn test_json_row_line_numbers() {
        let expander = TemplateExpander::new(json!("${data.id}"));
        let rows = parse_json_rows(r#"[{"id": "x"}, {"id": "y"}]"#).unwrap();
        let mut ctx = ExpressionContext::new();
        let results: Vec<_> = expander.expand_rows(&mut ctx, rows).collect();

        let lines: Vec<usize> = results.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![1, 2]);
        assert_eq!(results[1].expanded(), Some(&json!("y")));
    }

    #[test]
    fn test_collapsed_row_is_success_without_output() {
        let expander = TemplateExpander::new(json!({"a": "${missing}"}));
        let mut ctx = ExpressionContext::new();
        let results: Vec<_> = expander
            .expand_rows(&mut ctx, parse_csv_rows("x\n1\n").unwrap())
            .collect();
        assert!(results[0].is_success());
        assert_eq!(results[0].expanded(), None);
    }
}
