//! Text output for `show` and `grep`.

use chrono::{DateTime, Local, Utc};
use secrets_core::{Record, Schema, SearchHit};
use std::fmt::Write as _;
use std::ops::Range;

const HIGHLIGHT: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const PADDING: usize = 1;
const ENTRY_SEPARATOR: &str = "--------------------";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub table: bool,
    pub when: bool,
    pub color: bool,
}

/// One rendered value: the text to print and how many columns it occupies.
struct Cell {
    text: String,
    width: usize,
}

impl Cell {
    fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        let width = text.chars().count();
        Self { text, width }
    }

    fn highlighted(value: &str, spans: &[Range<usize>], color: bool) -> Self {
        if !color || spans.is_empty() {
            return Self::plain(value);
        }
        let mut text = String::with_capacity(value.len() + spans.len() * 9);
        let mut cursor = 0;
        for span in spans {
            if span.start < cursor || span.end > value.len() {
                continue;
            }
            text.push_str(&value[cursor..span.start]);
            text.push_str(HIGHLIGHT);
            text.push_str(&value[span.clone()]);
            text.push_str(RESET);
            cursor = span.end;
        }
        text.push_str(&value[cursor..]);
        Self {
            text,
            width: value.chars().count(),
        }
    }
}

/// Row of one record, with the match spans to highlight when coming from a search.
pub struct Row<'a> {
    pub record: &'a Record,
    pub hit: Option<&'a SearchHit<'a>>,
}

impl<'a> From<&'a Record> for Row<'a> {
    fn from(record: &'a Record) -> Self {
        Self { record, hit: None }
    }
}

impl<'a> From<&'a SearchHit<'a>> for Row<'a> {
    fn from(hit: &'a SearchHit<'a>) -> Self {
        Self {
            record: hit.record,
            hit: Some(hit),
        }
    }
}

pub fn render(schema: &Schema, rows: &[Row<'_>], options: RenderOptions) -> String {
    let mut headers = vec!["ID".to_string()];
    headers.extend(schema.names().map(str::to_string));
    if options.when {
        headers.push("Created".into());
        headers.push("Modified".into());
    }

    let cells: Vec<Vec<Option<Cell>>> = rows
        .iter()
        .map(|row| row_cells(schema, row, options))
        .collect();

    if options.table {
        table(&headers, &cells)
    } else {
        listing(&headers, &cells)
    }
}

fn row_cells(schema: &Schema, row: &Row<'_>, options: RenderOptions) -> Vec<Option<Cell>> {
    let mut cells = vec![Some(Cell::plain(row.record.id.to_string()))];
    for name in schema.names() {
        cells.push(row.record.value(name).map(|value| {
            let spans = row.hit.map(|hit| hit.spans_for(name)).unwrap_or(&[]);
            Cell::highlighted(value, spans, options.color)
        }));
    }
    if options.when {
        cells.push(Some(Cell::plain(local_time(row.record.created))));
        cells.push(Some(Cell::plain(local_time(row.record.modified))));
    }
    cells
}

fn local_time(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn table(headers: &[String], rows: &[Vec<Option<Cell>>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|row| row[i].as_ref().map(|cell| cell.width))
                .fold(header.chars().count(), usize::max)
        })
        .collect();

    let mut out = String::new();
    separator(&mut out, &widths);
    let header_cells: Vec<Option<Cell>> = headers.iter().map(|h| Some(Cell::plain(h.as_str()))).collect();
    line(&mut out, &header_cells, &widths);
    separator(&mut out, &widths);
    for row in rows {
        line(&mut out, row, &widths);
    }
    separator(&mut out, &widths);
    out
}

fn separator(out: &mut String, widths: &[usize]) {
    for width in widths {
        out.push('+');
        out.push_str(&"-".repeat(width + 2 * PADDING));
    }
    out.push_str("+\n");
}

fn line(out: &mut String, cells: &[Option<Cell>], widths: &[usize]) {
    for (cell, width) in cells.iter().zip(widths) {
        let (text, used) = cell
            .as_ref()
            .map(|c| (c.text.as_str(), c.width))
            .unwrap_or(("", 0));
        let pad = " ".repeat(PADDING);
        let fill = " ".repeat(width - used);
        let _ = write!(out, "|{pad}{text}{fill}{pad}");
    }
    out.push_str("|\n");
}

fn listing(headers: &[String], rows: &[Vec<Option<Cell>>]) -> String {
    let mut out = String::new();
    for row in rows {
        for (header, cell) in headers.iter().zip(row) {
            if let Some(cell) = cell {
                let _ = writeln!(out, "{header}: {}", cell.text);
            }
        }
        out.push_str(ENTRY_SEPARATOR);
        out.push('\n');
    }
    out
}
