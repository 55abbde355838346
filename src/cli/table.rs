//! ASCII table rendering for result sets.
//!
//! ```text
//! +----+-------+
//! | id | name  |
//! +----+-------+
//! | 1  | alice |
//! | 2  | bob   |
//! +----+-------+
//! ```

use crate::records::Row;
use crate::schema::Schema;

/// Renders rows under their schema's column headers. Widths fit the
/// widest cell per column.
pub fn format_rows(schema: &Schema, rows: &[Row]) -> String {
    let headers: Vec<String> = schema.columns().iter().map(|c| c.name().to_string()).collect();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.values()
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let text = value.to_string();
                    if i < widths.len() {
                        widths[i] = widths[i].max(text.len());
                    }
                    text
                })
                .collect()
        })
        .collect();

    let mut out = String::new();
    let separator = |out: &mut String| {
        out.push('+');
        for width in &widths {
            out.push_str(&"-".repeat(width + 2));
            out.push('+');
        }
        out.push('\n');
    };

    separator(&mut out);
    out.push('|');
    for (header, width) in headers.iter().zip(&widths) {
        out.push_str(&format!(" {:<width$} |", header, width = *width));
    }
    out.push('\n');
    separator(&mut out);

    for row in &cells {
        out.push('|');
        for (i, width) in widths.iter().enumerate() {
            let text = row.get(i).map(String::as_str).unwrap_or("");
            out.push_str(&format!(" {:<width$} |", text, width = *width));
        }
        out.push('\n');
    }
    separator(&mut out);

    out.push_str(&format!(
        "{} row{}\n",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" }
    ));
    out
}
