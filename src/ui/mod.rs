pub mod terminal;
pub mod text;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::ingest::{IngestCounts, IngestStats};
use crate::project::{self, ColumnSet, Table};
use crate::store::NodeStore;

pub use self::terminal::TerminalRenderer;
pub use self::text::TextRenderer;

/// Ingest health shown alongside the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub nodes: usize,
    pub counts: IngestCounts,
    pub updated: DateTime<Local>,
}

impl Status {
    /// One-line summary, e.g. `3 nodes | 120 msgs | 2 dropped | 14:02:11`.
    pub fn summary(&self) -> String {
        format!(
            "{} nodes | {} msgs | {} dropped | {}",
            self.nodes,
            self.counts.received,
            self.counts.dropped(),
            self.updated.format("%H:%M:%S"),
        )
    }
}

/// Egress for one projected frame.
pub trait Render {
    /// Replaces whatever was previously displayed with `table`.
    fn draw(&mut self, table: &Table, status: &Status) -> Result<()>;
}

/// Builds a frame from the store on every tick.
#[derive(Debug)]
pub struct Dashboard {
    columns: ColumnSet,
    store: Arc<NodeStore>,
    stats: Arc<IngestStats>,
}

impl Dashboard {
    pub fn new(columns: ColumnSet, store: Arc<NodeStore>, stats: Arc<IngestStats>) -> Self {
        Self {
            columns,
            store,
            stats,
        }
    }

    /// Reads the store once and projects it.
    pub fn frame(&self) -> (Table, Status) {
        let state = self.store.snapshot_all();
        let table = project::table(&self.columns, &state);
        let status = Status {
            nodes: state.len(),
            counts: self.stats.snapshot(),
            updated: Local::now(),
        };
        (table, status)
    }

    /// Projects and draws one frame.
    pub fn tick<R: Render>(&self, renderer: &mut R) -> Result<()> {
        let (table, status) = self.frame();
        trace!(rows = table.rows.len(), "drawing frame");
        renderer.draw(&table, &status)
    }
}

/// Display width of each column: the widest of header and cells, in chars.
pub fn column_widths(table: &Table) -> Vec<usize> {
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();

    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(w) => *w = (*w).max(len),
                None => widths.push(len),
            }
        }
    }

    widths
}

/// `q`, `Esc` or `Ctrl-C`. Raw mode swallows the SIGINT for the latter.
pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Cancels `cancel` when a quit key is pressed. Returns once cancelled or the
/// event stream ends.
pub async fn watch_keys(cancel: CancellationToken) {
    let mut events = EventStream::new();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };

        match event {
            Some(Ok(Event::Key(key))) if is_quit_key(&key) => {
                info!(key = ?key.code, "quit requested");
                cancel.cancel();
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "reading terminal events failed");
                break;
            }
            None => break,
        }
    }
}
