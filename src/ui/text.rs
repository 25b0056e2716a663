use std::io::Write;

use anyhow::{Context, Result};

use super::{column_widths, Render, Status};
use crate::project::Table;

const GAP: &str = "  ";

/// Plain left-aligned text frames, one after another.
///
/// Used for `--plain` output where no terminal control is available.
pub struct TextRenderer<W: Write> {
    out: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Render for TextRenderer<W> {
    fn draw(&mut self, table: &Table, status: &Status) -> Result<()> {
        let widths = column_widths(table);
        let mut frame = String::new();

        frame.push_str(&status.summary());
        frame.push('\n');
        push_line(&mut frame, &table.headers, &widths);
        for row in &table.rows {
            push_line(&mut frame, row, &widths);
        }
        frame.push('\n');

        self.out
            .write_all(frame.as_bytes())
            .context("writing frame")?;
        self.out.flush().context("flushing frame")?;
        Ok(())
    }
}

fn push_line(frame: &mut String, cells: &[String], widths: &[usize]) {
    let start = frame.len();

    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            frame.push_str(GAP);
        }
        frame.push_str(cell);
        let width = widths.get(i).copied().unwrap_or(0);
        let pad = width.saturating_sub(cell.chars().count());
        frame.extend(std::iter::repeat(' ').take(pad));
    }

    let trimmed = frame[start..].trim_end().len();
    frame.truncate(start + trimmed);
    frame.push('\n');
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::ingest::IngestCounts;

    fn status() -> Status {
        Status {
            nodes: 2,
            counts: IngestCounts {
                received: 10,
                stored: 8,
                decode_errors: 1,
                missing_identity: 1,
            },
            updated: Local
                .with_ymd_and_hms(2024, 5, 1, 12, 30, 5)
                .single()
                .expect("unambiguous time"),
        }
    }

    #[test]
    fn test_text_frame_layout() {
        let table = Table {
            headers: vec!["Addr".to_string(), "Peers".to_string(), "<- p99".to_string()],
            rows: vec![
                vec!["a".to_string(), "5".to_string(), "300μs".to_string()],
                vec!["node-22".to_string(), "120".to_string(), "0μs".to_string()],
            ],
        };

        let mut renderer = TextRenderer::new(Vec::new());
        renderer.draw(&table, &status()).expect("draw");
        let out = String::from_utf8(renderer.into_inner()).expect("utf8");

        let expected = "\
2 nodes | 10 msgs | 2 dropped | 12:30:05
Addr     Peers  <- p99
a        5      300μs
node-22  120    0μs

";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_text_frame_empty_table() {
        let table = Table {
            headers: vec!["Addr".to_string(), "Peers".to_string()],
            rows: Vec::new(),
        };

        let mut renderer = TextRenderer::new(Vec::new());
        renderer.draw(&table, &status()).expect("draw");
        let out = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert!(out.ends_with("Addr  Peers\n\n"));
    }

    #[test]
    fn test_frames_append() {
        let table = Table::default();
        let mut renderer = TextRenderer::new(Vec::new());
        renderer.draw(&table, &status()).expect("first");
        renderer.draw(&table, &status()).expect("second");
        let out = String::from_utf8(renderer.into_inner()).expect("utf8");
        assert_eq!(out.matches("2 nodes").count(), 2);
    }
}
