//! Tool return values and their canonical text form
//!
//! Model backends only consume text, so every structured result is rendered
//! here before it enters a transcript.

use serde_json::Value;

/// What a tool callable hands back
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Already text, passed through untouched
    Text(String),
    /// Arbitrary JSON; strings lose their quotes, everything else is compact JSON
    Json(Value),
    /// Tabular data rendered as a pipe table
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
}

impl ToolOutput {
    /// Build a table from column names and rows
    pub fn table(columns: Vec<impl Into<String>>, rows: Vec<Vec<Value>>) -> Self {
        Self::Table {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Canonical text form used in transcripts
    pub fn to_canonical_text(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Json(value) => render_value(value),
            ToolOutput::Table { columns, rows } => render_table(columns, rows),
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_table(columns: &[String], rows: &[Vec<Value>]) -> String {
    if columns.is_empty() {
        return "(empty table)".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", columns.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        columns.iter().map(|_| "---|").collect::<String>()
    ));

    for row in rows {
        let cells: Vec<String> = (0..columns.len())
            .map(|i| {
                row.get(i)
                    .map(render_value)
                    .unwrap_or_default()
                    .replace('|', "\\|")
                    .replace('\n', " ")
            })
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    out.truncate(out.trim_end().len());
    out
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Json(value)
    }
}

impl From<i64> for ToolOutput {
    fn from(n: i64) -> Self {
        ToolOutput::Json(Value::from(n))
    }
}

impl From<f64> for ToolOutput {
    fn from(n: f64) -> Self {
        ToolOutput::Json(Value::from(n))
    }
}

impl From<bool> for ToolOutput {
    fn from(b: bool) -> Self {
        ToolOutput::Json(Value::from(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(ToolOutput::from(5i64).to_canonical_text(), "5");
        assert_eq!(ToolOutput::from(json!("AAPL")).to_canonical_text(), "AAPL");
        assert_eq!(ToolOutput::from(true).to_canonical_text(), "true");
    }

    #[test]
    fn test_json_is_compact() {
        let out = ToolOutput::from(json!({"close": [1, 2]}));
        assert_eq!(out.to_canonical_text(), r#"{"close":[1,2]}"#);
    }

    #[test]
    fn test_table_rendering() {
        let out = ToolOutput::table(
            vec!["date", "close"],
            vec![
                vec![json!("2024-01-02"), json!(185.6)],
                vec![json!("2024-01-03"), json!("n|a")],
            ],
        );
        let text = out.to_canonical_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "| date | close |");
        assert_eq!(lines[1], "|---|---|");
        assert_eq!(lines[2], "| 2024-01-02 | 185.6 |");
        assert_eq!(lines[3], "| 2024-01-03 | n\\|a |");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let out = ToolOutput::table(vec!["a", "b"], vec![vec![json!(1)]]);
        assert!(out.to_canonical_text().ends_with("| 1 |  |"));
    }
}
