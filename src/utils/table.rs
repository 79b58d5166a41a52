//! Fixed-width tables for command output.
//!
//! Colour codes wrap the already padded text, so they never count towards a
//! column's width.

use crate::utils::colors::RESET;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

pub struct Column {
    header: &'static str,
    width: usize,
    align: Align,
}

impl Column {
    pub fn left(header: &'static str, width: usize) -> Self {
        Self {
            header,
            width,
            align: Align::Left,
        }
    }

    pub fn right(header: &'static str, width: usize) -> Self {
        Self {
            header,
            width,
            align: Align::Right,
        }
    }

    fn pad(&self, text: &str) -> String {
        match self.align {
            Align::Left => format!("{:<w$}", text, w = self.width),
            Align::Right => format!("{:>w$}", text, w = self.width),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    text: String,
    color: Option<&'static str>,
}

impl Cell {
    pub fn colored(text: impl Into<String>, color: &'static str) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
        }
    }
}

impl From<String> for Cell {
    fn from(text: String) -> Self {
        Self { text, color: None }
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        text.to_string().into()
    }
}

pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        let header: Vec<String> = self.columns.iter().map(|c| c.pad(c.header)).collect();
        out.push_str(header.join(" ").trim_end());
        out.push('\n');

        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let cell = row.get(i).cloned().unwrap_or_default();
                    let padded = col.pad(&cell.text);
                    match cell.color {
                        Some(color) => format!("{}{}{}", color, padded, RESET),
                        None => padded,
                    }
                })
                .collect();
            out.push_str(&cells.join(" "));
            out.push('\n');
        }

        out
    }
}
