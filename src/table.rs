//! Plain-text grid and card renderings of query results.

use std::{borrow::Cow, fmt::Write as _};

use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{rows::Row, schema::Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    Card,
}

impl ViewMode {
    pub fn render(self, table: &Table, rows: &[&Row]) -> String {
        match self {
            ViewMode::Grid => render_grid(table, rows),
            ViewMode::Card => render_cards(table, rows),
        }
    }
}

/// One line per row under a header of column names, cells padded to the
/// widest value in their column.
pub fn render_grid(table: &Table, rows: &[&Row]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| table.columns.iter().map(|c| row.display(c)).collect())
        .collect();
    render_lines(&table.headers(), &cells)
}

/// Header, dashed rule, then one padded line per record.
pub fn render_lines(headers: &[String], cells: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h).max(3)).collect();
    for row in cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in cells {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

/// One block per row: the primary column's value as a title, then every
/// other column as `label: value`.
pub fn render_cards(table: &Table, rows: &[&Row]) -> String {
    let label_width = table
        .columns
        .iter()
        .skip(1)
        .map(|c| display_width(&c.name))
        .max()
        .unwrap_or(0);

    let mut output = String::new();
    for (index, row) in rows.iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }
        let title = match table.primary_column() {
            Some(column) => row.display(column),
            None => row.id.clone(),
        };
        let title = if title.trim().is_empty() {
            row.id.clone()
        } else {
            title
        };
        let _ = writeln!(output, "# {}", sanitize(&title));
        for column in table.columns.iter().skip(1) {
            let padding = label_width.saturating_sub(display_width(&column.name));
            let _ = writeln!(
                output,
                "  {}:{} {}",
                column.name,
                " ".repeat(padding),
                sanitize(&row.display(column))
            );
        }
    }
    output
}

fn format_line(values: &[String], widths: &[usize]) -> String {
    let mut line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = sanitize(value);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        rows::Fields,
        schema::{ColumnType, NewColumn},
    };

    fn people() -> Table {
        let table = Table::new(
            "t",
            "People",
            vec![
                NewColumn::new("Name", ColumnType::Text).with_id("name"),
                NewColumn::new("Age", ColumnType::Number).with_id("age"),
            ],
        )
        .unwrap();
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::text("Amy\nLee"));
        fields.insert("age".into(), Value::Number(31.0));
        table.create_row(Some("r1".into()), fields).unwrap().0
    }

    #[test]
    fn grid_pads_columns_and_flattens_newlines() {
        let table = people();
        let rows: Vec<&Row> = table.rows.iter().collect();
        let rendered = render_grid(&table, &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Name     Age");
        assert_eq!(lines[1], "-------  ---");
        assert_eq!(lines[2], "Amy Lee  31");
    }

    #[test]
    fn cards_title_with_primary_column() {
        let table = people();
        let rows: Vec<&Row> = table.rows.iter().collect();
        let rendered = ViewMode::Card.render(&table, &rows);
        assert_eq!(rendered, "# Amy Lee\n  Age: 31\n");
    }

    #[test]
    fn empty_result_still_has_header() {
        let table = people();
        let rendered = render_grid(&table, &[]);
        assert_eq!(rendered.lines().count(), 2);
        assert!(render_cards(&table, &[]).is_empty());
    }
}
