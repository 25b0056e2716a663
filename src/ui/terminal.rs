use std::io::{self, Stdout};

use anyhow::{Context, Result};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, BorderType, Borders, Cell, Row, Table as TableWidget};
use ratatui::{Frame, Terminal};
use tracing::warn;

use super::{column_widths, Render, Status};
use crate::project::Table;

/// Full-screen table on the alternate screen.
///
/// Raw mode and the alternate screen are released on drop, including on
/// early return and panic unwinding.
pub struct TerminalRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalRenderer {
    pub fn new() -> Result<Self> {
        enable_raw_mode().context("enabling raw mode")?;

        if let Err(e) = io::stdout().execute(EnterAlternateScreen) {
            restore();
            return Err(e).context("entering alternate screen");
        }

        let mut terminal = match Terminal::new(CrosstermBackend::new(io::stdout())) {
            Ok(terminal) => terminal,
            Err(e) => {
                restore();
                return Err(e).context("creating terminal");
            }
        };

        if let Err(e) = terminal.hide_cursor() {
            warn!(error = %e, "hiding cursor failed");
        }

        Ok(Self { terminal })
    }
}

impl Render for TerminalRenderer {
    fn draw(&mut self, table: &Table, status: &Status) -> Result<()> {
        self.terminal
            .draw(|frame| render_table(frame, table, status))
            .context("drawing frame")?;
        Ok(())
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        restore();
        if let Err(e) = self.terminal.show_cursor() {
            warn!(error = %e, "showing cursor failed");
        }
    }
}

fn restore() {
    if let Err(e) = disable_raw_mode() {
        warn!(error = %e, "disabling raw mode failed");
    }
    if let Err(e) = io::stdout().execute(LeaveAlternateScreen) {
        warn!(error = %e, "leaving alternate screen failed");
    }
}

fn render_table(frame: &mut Frame, table: &Table, status: &Status) {
    let header_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);
    let cell_style = Style::default().fg(Color::Gray);

    let header = Row::new(table.headers.iter().map(|h| centered(h, header_style)));
    let rows = table
        .rows
        .iter()
        .map(|row| Row::new(row.iter().map(|c| centered(c, cell_style))));

    let widths: Vec<Constraint> = column_widths(table)
        .into_iter()
        .map(|w| Constraint::Length(u16::try_from(w + 2).unwrap_or(u16::MAX)))
        .collect();

    let widget = TableWidget::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(format!(" clustertop | {} ", status.summary()))
                .borders(Borders::ALL)
                .border_type(BorderType::Plain)
                .border_style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(widget, frame.area());
}

fn centered(text: &str, style: Style) -> Cell<'_> {
    Cell::from(Line::from(text).alignment(Alignment::Center)).style(style)
}
