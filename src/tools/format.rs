//! Output formatting for statement results.
//!
//! `vertical` is the default: one numbered block per row, bounded by a
//! character budget so a large result cannot flood the caller's context.
//! The other formats render the full (row-capped) result.

use crate::models::{QueryResult, StatementOutcome, render_value};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Numbered "column: value" blocks (default)
    #[default]
    Vertical,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Markdown table format
    Markdown,
    /// JSON object with columns, rows and counts
    Json,
}

/// Render whatever a statement produced.
pub fn format_outcome(outcome: &StatementOutcome, format: OutputFormat, max_chars: usize) -> String {
    match outcome {
        StatementOutcome::Affected { rows_affected } => {
            format!("Success: {} rows affected", rows_affected)
        }
        StatementOutcome::Rows(result) => format_result(result, format, max_chars),
    }
}

pub fn format_result(result: &QueryResult, format: OutputFormat, max_chars: usize) -> String {
    match format {
        OutputFormat::Vertical => format_vertical(result, max_chars),
        OutputFormat::Table => format_as_table(result),
        OutputFormat::Markdown => format_as_markdown(result),
        OutputFormat::Json => format_as_json(result),
    }
}

/// Numbered row blocks followed by a summary line.
///
/// Each line costs its length plus one for the line break. The first row
/// block that would push the total past `max_chars` is dropped along with
/// everything after it.
pub fn format_vertical(result: &QueryResult, max_chars: usize) -> String {
    if result.database_row_count == 0 {
        return "No rows returned".to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut size = 0usize;
    let mut shown = 0usize;
    let mut over_budget = false;

    for (i, row) in result.rows.iter().enumerate() {
        let mut block = Vec::with_capacity(row.len() + 2);
        block.push(format!("{}. row", i + 1));
        for (column, value) in result.columns.iter().zip(row) {
            block.push(format!("{}: {}", column, render_value(value)));
        }
        block.push(String::new());

        size += block.iter().map(|l| l.chars().count() + 1).sum::<usize>();
        if size > max_chars {
            over_budget = true;
            break;
        }
        lines.extend(block);
        shown += 1;
    }

    if over_budget || result.truncated {
        lines.push(format!(
            "Result: showing first {} rows (output truncated)",
            shown
        ));
    } else {
        lines.push(format!("Result: {} rows", result.database_row_count));
    }
    lines.join("\n")
}

pub fn format_as_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.width()).collect();
    for row in &result.rows {
        for (i, value) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(render_value(value).width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    for (name, w) in result.columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad_center(name, *w)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in &result.rows {
        for (i, w) in widths.iter().enumerate() {
            let value = row.get(i).unwrap_or(&JsonValue::Null);
            let text = render_value(value);
            let cell = if value.is_number() {
                pad_left(&text, *w)
            } else {
                pad_right(&text, *w)
            };
            output.push_str(&format!("| {} ", cell));
        }
        output.push_str("|\n");
    }

    output.push_str(&separator);
    output.push_str(&row_count_footer(result));
    output
}

pub fn format_as_markdown(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();
    let header: String = result
        .columns
        .iter()
        .map(|c| format!("| {} ", escape_markdown(c)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&(result.columns.iter().map(|_| "|---").collect::<String>() + "|\n"));

    for row in &result.rows {
        let line: String = row
            .iter()
            .map(|value| format!("| {} ", escape_markdown(&render_value(value))))
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{}*", row_count_footer(result).trim_end()));
    output
}

pub fn format_as_json(result: &QueryResult) -> String {
    let body = json!({
        "columns": result.columns,
        "rows": result.to_json_rows(),
        "database_row_count": result.database_row_count,
        "returned_row_count": result.returned_row_count,
        "truncated": result.truncated,
    });
    serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
}

fn row_count_footer(result: &QueryResult) -> String {
    let noun = if result.database_row_count == 1 { "row" } else { "rows" };
    if result.truncated {
        format!(
            "{} {} in set, showing first {}\n",
            result.database_row_count, noun, result.returned_row_count
        )
    } else {
        format!("{} {} in set\n", result.database_row_count, noun)
    }
}

// `format!` width specifiers count chars, not display columns, so wide
// characters need manual padding.

fn pad_right(text: &str, width: usize) -> String {
    format!("{}{}", text, " ".repeat(width.saturating_sub(text.width())))
}

fn pad_left(text: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(text.width())), text)
}

fn pad_center(text: &str, width: usize) -> String {
    let gap = width.saturating_sub(text.width());
    let left = gap / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(gap - left))
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(rows: Vec<Vec<JsonValue>>) -> QueryResult {
        QueryResult::from_rows(vec!["id".into(), "name".into()], rows, 100)
    }

    #[test]
    fn test_vertical_layout() {
        let text = format_vertical(
            &result(vec![
                vec![json!(1), json!("ann")],
                vec![json!(2), JsonValue::Null],
            ]),
            4000,
        );
        assert_eq!(
            text,
            "1. row\nid: 1\nname: ann\n\n2. row\nid: 2\nname: NULL\n\nResult: 2 rows"
        );
    }

    #[test]
    fn test_vertical_no_rows() {
        assert_eq!(format_vertical(&result(Vec::new()), 4000), "No rows returned");
    }

    #[test]
    fn test_vertical_char_budget() {
        // Each block: "N. row"(7) + "id: N"(6) + "name: xxxxxxxxxx"(17) + ""(1) = 31
        let rows = (1..=9)
            .map(|i| vec![json!(i), json!("xxxxxxxxxx")])
            .collect();
        let text = format_vertical(&result(rows), 70);
        assert!(text.ends_with("Result: showing first 2 rows (output truncated)"));
        assert!(text.contains("2. row"));
        assert!(!text.contains("3. row"));
    }

    #[test]
    fn test_vertical_row_cap_is_reported() {
        let rows = (0..5).map(|i| vec![json!(i), json!("x")]).collect();
        let capped = QueryResult::from_rows(vec!["id".into(), "name".into()], rows, 3);
        let text = format_vertical(&capped, 4000);
        assert!(text.ends_with("Result: showing first 3 rows (output truncated)"));
    }

    #[test]
    fn test_outcome_affected() {
        let outcome = StatementOutcome::Affected { rows_affected: 3 };
        assert_eq!(
            format_outcome(&outcome, OutputFormat::Vertical, 4000),
            "Success: 3 rows affected"
        );
    }

    #[test]
    fn test_table_alignment_with_wide_chars() {
        let text = format_as_table(&result(vec![
            vec![json!(7), json!("日本")],
            vec![json!(12), json!("ab")],
        ]));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+----+------+");
        assert_eq!(lines[1], "| id | name |");
        assert_eq!(lines[3], "|  7 | 日本 |");
        assert_eq!(lines[4], "| 12 | ab   |");
        assert_eq!(lines[6], "2 rows in set");
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let text = format_as_markdown(&result(vec![vec![json!(1), json!("a|b")]]));
        assert!(text.starts_with("| id | name |\n|---|---|\n| 1 | a\\|b |\n"));
        assert!(text.ends_with("*1 row in set*"));
    }

    #[test]
    fn test_json_format() {
        let text = format_as_json(&result(vec![vec![json!(1), JsonValue::Null]]));
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["rows"][0]["id"], json!(1));
        assert_eq!(parsed["rows"][0]["name"], JsonValue::Null);
        assert_eq!(parsed["truncated"], json!(false));
    }

    #[test]
    fn test_format_deserializes_lowercase() {
        let format: OutputFormat = serde_json::from_value(json!("markdown")).unwrap();
        assert_eq!(format, OutputFormat::Markdown);
        assert_eq!(OutputFormat::default(), OutputFormat::Vertical);
    }
}
