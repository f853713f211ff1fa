use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};

use super::grid::{LABEL_WIDTH, SpanRow, draw_step_grid};
use super::mode::{Hit, HitMap, TuiState};
use crate::audio_api::EnvelopeStage;
use crate::pipeline::controller::ControllerId;
use crate::shared::{DisplayState, Note, TRACK_COUNT};

const HELP: &str = "space play/stop  arrows+enter edit  a..k notes  z/x octave  tab/[ ] knobs  < > fader  ( ) pan  , . - = fx  0 clear  esc quit";

// draws everything and returns where the clickable bits ended up
pub fn render(frame: &mut Frame, area: Rect, ds: &DisplayState, ts: &TuiState, audio_online: bool) -> HitMap {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                      // transport + master
            Constraint::Length(TRACK_COUNT as u16 + 3), // step grid
            Constraint::Length(TRACK_COUNT as u16 + 2), // envelopes + mix
            Constraint::Length(3),                      // keyboard
            Constraint::Length(3),                      // fx
            Constraint::Min(1),                         // help
        ])
        .split(area);

    let mut hits = HitMap::default();
    draw_header(frame, sections[0], ds, ts, audio_online, &mut hits);
    draw_step_grid(frame, sections[1], ds, ts, &mut hits);
    draw_knobs(frame, sections[2], ds, ts, &mut hits);
    draw_keyboard(frame, sections[3], ds, &mut hits);
    draw_fx(frame, sections[4], ts, &mut hits);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        sections[5],
    );
    hits
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
}

fn knob_style(id: ControllerId, ds: &DisplayState, ts: &TuiState) -> Style {
    if ds.dragging.contains(&id) {
        Style::default().fg(Color::Black).bg(Color::Yellow)
    } else if ts.selected_knob() == Some(id) {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::REVERSED)
    } else {
        Style::default().fg(Color::Cyan)
    }
}

fn draw_header(frame: &mut Frame, area: Rect, ds: &DisplayState, ts: &TuiState, audio_online: bool, hits: &mut HitMap) {
    let block = panel(" AETHERSEQ ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let dim = Style::default().fg(Color::DarkGray);
    let mut row = SpanRow::new(inner, inner.y);
    let (state, state_style) = if ds.playing {
        ("▶ PLAY ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        ("■ STOP ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
    };
    row.push(state, state_style);
    row.push("  ", dim);
    if let Some(rect) = row.push(format!("BPM {:>5.1}", ds.bpm), knob_style(ControllerId::Bpm, ds, ts)) {
        hits.push(rect, Hit::Knob(ControllerId::Bpm));
    }
    row.push("  ", dim);
    let master = ControllerId::MasterVolume;
    if let Some(rect) = row.push(format!("VOL {:>5.1}dB", ds.master_volume_db), knob_style(master, ds, ts)) {
        hits.push(rect, Hit::Knob(master));
    }
    row.push("  ", dim);
    if audio_online {
        row.push("audio on", Style::default().fg(Color::Green));
    } else {
        row.push("audio off", Style::default().fg(Color::Red));
    }
    row.push(format!("  {}", ts.status), Style::default().fg(Color::Gray));

    frame.render_widget(Paragraph::new(row.line()), inner);
}

fn draw_knobs(frame: &mut Frame, area: Rect, ds: &DisplayState, ts: &TuiState, hits: &mut HitMap) {
    let block = panel(" ENVELOPES / MIX ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let dim = Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line> = Vec::with_capacity(ds.tracks.len());
    for (track, t) in ds.tracks.iter().enumerate() {
        let y = inner.y + track as u16;
        let mut row = SpanRow::new(inner, y);
        row.push(format!("{:<width$}", t.name, width = LABEL_WIDTH as usize), Style::default().fg(Color::Gray));
        row.push(format!("{:<12}", t.kind_label), dim);

        for stage in EnvelopeStage::ALL {
            let id = ControllerId::Envelope { track, stage };
            row.push(format!("{} ", stage.label()), dim);
            if let Some(rect) = row.push(format!("{:>5.2}", t.envelope.get(stage)), knob_style(id, ds, ts)) {
                if y < inner.bottom() {
                    hits.push(rect, Hit::Knob(id));
                }
            }
            row.push("  ", dim);
        }

        row.push("│ ", dim);
        let fader_style = if ts.cursor_track == track {
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Magenta)
        };
        if let Some(rect) = row.push(format!("VOL {:>5.1}", t.volume_db), fader_style) {
            if y < inner.bottom() {
                hits.push(rect, Hit::Fader(track));
            }
        }
        row.push("  ", dim);
        if let Some(rect) = row.push(format!("PAN {:>5.2}", t.pan), dim) {
            if y < inner.bottom() {
                hits.push(rect, Hit::Pan(track));
            }
        }
        lines.push(row.line());
    }
    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_keyboard(frame: &mut Frame, area: Rect, ds: &DisplayState, hits: &mut HitMap) {
    let block = panel(" KEYBOARD ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut row = SpanRow::new(inner, inner.y);
    for note in Note::keyboard(ds.octave) {
        let style = if note == ds.selected_note {
            Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else if note.is_sharp() {
            Style::default().fg(Color::White).bg(Color::Black)
        } else {
            Style::default().fg(Color::Black).bg(Color::White)
        };
        if let Some(rect) = row.push(format!(" {:<4}", note.to_string()), style) {
            hits.push(rect, Hit::Key(note));
        }
    }
    frame.render_widget(Paragraph::new(row.line()), inner);
}

fn draw_fx(frame: &mut Frame, area: Rect, ts: &TuiState, hits: &mut HitMap) {
    let block = panel(" FX ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let dim = Style::default().fg(Color::DarkGray);
    let mut row = SpanRow::new(inner, inner.y);
    for kind in crate::audio_api::EffectKind::ALL {
        let value = ts.fx_values[kind.index()];
        let text = match kind.range() {
            (_, max) if max > 1.0 => format!("{} {:.0}", kind.label(), value),
            _ => format!("{} {:.2}", kind.label(), value),
        };
        let style = if ts.selected_fx() == kind {
            Style::default().fg(Color::Green).add_modifier(Modifier::REVERSED)
        } else {
            Style::default().fg(Color::Green)
        };
        if let Some(rect) = row.push(text, style) {
            hits.push(rect, Hit::Fx(kind));
        }
        row.push("   ", dim);
    }
    frame.render_widget(Paragraph::new(row.line()), inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::middle::Middle;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn draw(width: u16, height: u16, ds: &DisplayState, ts: &TuiState) -> (HitMap, String) {
        let mut term = Terminal::new(TestBackend::new(width, height)).unwrap();
        let mut hits = HitMap::default();
        term.draw(|frame| {
            hits = render(frame, frame.area(), ds, ts, false);
        })
        .unwrap();
        let text = term.backend().buffer().content().iter().map(|c| c.symbol()).collect::<String>();
        (hits, text)
    }

    #[test]
    fn draws_every_track_and_maps_the_grid() {
        let middle = Middle::new(&Config::default());
        let mut ts = TuiState::default();
        let ds = middle.display_state();
        ts.sync(&ds);
        let (hits, text) = draw(140, 40, &ds, &ts);

        for name in ["VOID", "AETHER", "CRYSTAL", "RESONANCE", "FLUX", "CELESTIA", "ORBIT"] {
            assert!(text.contains(name), "{name} missing");
        }
        assert!(text.contains("BPM 120.0"));
        assert!(text.contains("audio off"));

        // grid starts inside the border, after the header block and the step numbers
        let first_cell_x = 1 + LABEL_WIDTH;
        let first_cell_y = 3 + 1 + 1;
        assert_eq!(hits.at(first_cell_x, first_cell_y), Some(Hit::Cell { track: 0, step: 0 }));
        assert_eq!(
            hits.at(first_cell_x + 2 * 31, first_cell_y + 6),
            Some(Hit::Cell { track: 6, step: 31 })
        );
        assert!(hits.len() > 7 * 32);
    }

    #[test]
    fn narrow_terminal_drops_offscreen_zones() {
        let middle = Middle::new(&Config::default());
        let ts = TuiState::default();
        let (hits, _) = draw(40, 40, &middle.display_state(), &ts);
        assert!(hits.at(39, 5).is_none_or(|hit| matches!(hit, Hit::Cell { step, .. } if step < 14)));
        assert!(hits.len() < 7 * 32);
    }
}
