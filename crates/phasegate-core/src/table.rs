//! Markdown pipe-table reading and single-cell rewriting.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    /// 0-based line index of the row within the source text.
    pub line: usize,
    /// The row exactly as it appears in the source, without the line ending.
    pub raw: String,
    pub cells: Vec<String>,
}

impl Row {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Index of the first header cell equal to `name`, ignoring case.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    Some(trimmed.trim_start_matches('#').trim())
}

fn is_table_line(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn is_separator(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

/// Split a table row into trimmed cell values.
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

/// Locate the first table under a heading whose text starts with `heading`
/// (case-insensitive), skip its header and separator rows, and return the
/// rest. A missing heading or table yields an empty `Table`.
pub fn parse_table(text: &str, heading: &str) -> Table {
    let wanted = heading.to_ascii_lowercase();
    let mut lines = text.lines().enumerate();

    let found = lines.by_ref().any(|(_, line)| {
        heading_text(line)
            .map(|h| h.to_ascii_lowercase().starts_with(&wanted))
            .unwrap_or(false)
    });
    if !found {
        return Table::default();
    }

    let mut table = Table::default();
    let mut in_table = false;
    for (idx, line) in lines {
        if heading_text(line).is_some() {
            break;
        }
        if !is_table_line(line) {
            if in_table {
                break;
            }
            continue;
        }
        let cells = split_cells(line);
        if !in_table {
            table.header = cells;
            in_table = true;
            continue;
        }
        if table.rows.is_empty() && is_separator(&cells) {
            continue;
        }
        table.rows.push(Row {
            line: idx,
            raw: line.trim_end_matches('\r').to_string(),
            cells,
        });
    }
    table
}

/// Rewrite cell `column` of a raw table row to `new_value`. Everything outside
/// the cell's content, including its padding, is kept byte-for-byte. Returns
/// `None` when the row has no such column.
pub fn update_table_cell(row: &str, column: usize, new_value: &str) -> Option<String> {
    let mut bounds: Vec<usize> = row.match_indices('|').map(|(i, _)| i).collect();
    if bounds.is_empty() {
        return None;
    }
    if !row.trim_end().ends_with('|') {
        bounds.push(row.len());
    }
    if column + 1 >= bounds.len() {
        return None;
    }
    let start = bounds[column] + 1;
    let end = bounds[column + 1];
    let segment = &row[start..end];

    let content = segment.trim();
    let (lead, trail) = if content.is_empty() {
        (" ", if segment.len() > 1 { " " } else { "" })
    } else {
        let lead_len = segment.len() - segment.trim_start().len();
        let trail_len = segment.len() - segment.trim_end().len();
        (&segment[..lead_len], &segment[segment.len() - trail_len..])
    };

    let mut out = String::with_capacity(row.len() + new_value.len());
    out.push_str(&row[..start]);
    out.push_str(lead);
    out.push_str(new_value);
    out.push_str(trail);
    out.push_str(&row[end..]);
    Some(out)
}

/// Replace line `index` of `text` with `new_line`, keeping every line ending.
pub fn replace_line(text: &str, index: usize, new_line: &str) -> String {
    let mut out = String::with_capacity(text.len() + new_line.len());
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if i == index {
            out.push_str(new_line);
            if line.ends_with("\r\n") {
                out.push_str("\r\n");
            } else if line.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(line);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
