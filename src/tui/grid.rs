use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use super::mode::{Hit, HitMap, TuiState};
use crate::shared::{DisplayState, STEP_COUNT};

pub const LABEL_WIDTH: u16 = 11;
pub const CELL_WIDTH: u16 = 2;

// Builds one line of spans left to right and hands back the screen rect of
// every span, so hit zones always match what was drawn.
pub struct SpanRow<'a> {
    spans: Vec<Span<'a>>,
    x: u16,
    y: u16,
    right: u16,
}

impl<'a> SpanRow<'a> {
    pub fn new(area: Rect, y: u16) -> Self {
        Self {
            spans: Vec::new(),
            x: area.x,
            y,
            right: area.right(),
        }
    }

    // None once the span runs off the right edge
    pub fn push(&mut self, text: impl Into<String>, style: Style) -> Option<Rect> {
        let text = text.into();
        let width = text.chars().count() as u16;
        let rect = Rect::new(self.x, self.y, width, 1);
        self.x = self.x.saturating_add(width);
        self.spans.push(Span::styled(text, style));
        (rect.right() <= self.right).then_some(rect)
    }

    pub fn line(self) -> Line<'a> {
        Line::from(self.spans)
    }
}

pub fn draw_step_grid(frame: &mut Frame, area: Rect, ds: &DisplayState, ts: &TuiState, hits: &mut HitMap) {
    let block = Block::default()
        .title(format!(" PATTERN  note {}  oct {} ", ds.selected_note, ds.octave))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::with_capacity(ds.cells.len() + 1);

    // step numbers, every beat
    let mut header = SpanRow::new(inner, inner.y);
    header.push(" ".repeat(LABEL_WIDTH as usize), dim);
    for step in 0..STEP_COUNT {
        let label = if step % 4 == 0 { format!("{:<2}", step + 1) } else { "  ".to_string() };
        let style = if ts.playing_step == Some(step) { Style::default().fg(Color::Yellow) } else { dim };
        header.push(label, style);
    }
    lines.push(header.line());

    for (track, row) in ds.cells.iter().enumerate() {
        let y = inner.y + 1 + track as u16;
        let mut line = SpanRow::new(inner, y);
        let name = ds.tracks.get(track).map(|t| t.name).unwrap_or("");
        let name_style = if ts.cursor_track == track {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        line.push(format!("{:<width$}", name, width = LABEL_WIDTH as usize), name_style);

        for (step, cell) in row.iter().enumerate() {
            let glyph = if cell.is_some() { "■ " } else { "· " };
            let cursor = ts.cursor_track == track && ts.cursor_step == step;
            let style = cell_style(cell.is_some(), ts.playing_step == Some(step), step % 4 == 0, cursor);
            if let Some(rect) = line.push(glyph, style) {
                if y < inner.bottom() {
                    hits.push(rect, Hit::Cell { track, step });
                }
            }
        }
        lines.push(line.line());
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn cell_style(filled: bool, playing: bool, on_beat: bool, cursor: bool) -> Style {
    let mut style = match (filled, playing) {
        (true, true) => Style::default().fg(Color::Black).bg(Color::LightMagenta),
        (true, false) => Style::default().fg(Color::LightMagenta),
        (false, true) => Style::default().fg(Color::Yellow).bg(Color::DarkGray),
        (false, false) if on_beat => Style::default().fg(Color::Gray),
        (false, false) => Style::default().fg(Color::DarkGray),
    };
    if cursor {
        style = style.add_modifier(Modifier::REVERSED);
    }
    style
}
