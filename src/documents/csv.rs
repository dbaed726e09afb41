//! CSV rendered as a plain-text table: header first, one line per row,
//! columns padded to a common width.

pub(super) fn render(input: &str) -> String {
    let rows = parse(input);
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);

    let mut widths = vec![0usize; columns];
    for row in &rows {
        for (i, field) in row.iter().enumerate() {
            widths[i] = widths[i].max(field.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            let cells: Vec<String> = (0..columns)
                .map(|i| {
                    let field = row.get(i).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", field, width = widths[i])
                })
                .collect();
            cells.join("  ").trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Comma-separated records with RFC 4180 quoting. Blank lines are skipped.
fn parse(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                // Multi-line fields are flattened onto one line.
                '\r' | '\n' => field.push(' '),
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                finish_row(&mut rows, std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        finish_row(&mut rows, row);
    }
    rows
}

fn finish_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|field| !field.trim().is_empty()) {
        rows.push(row.into_iter().map(|f| f.trim().to_string()).collect());
    }
}
