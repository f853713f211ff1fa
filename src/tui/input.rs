use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};

use super::mode::{Hit, TuiState};
use crate::pipeline::controller::PointerId;
use crate::shared::{InputEvent, Note};

const MOUSE: PointerId = PointerId(0);
// a terminal row is a coarse pixel; this much knob travel per row dragged
const ROW_TRAVEL: f32 = 4.0;
const FADER_STEP_DB: f32 = 1.0;
const PAN_STEP: f32 = 0.1;
const FX_STEPS: f32 = 50.0; // fx nudges cover the full range in this many presses

// piano layout on the home row, one octave plus the next C
const PIANO_KEYS: [char; 13] = ['a', 'w', 's', 'e', 'd', 'f', 't', 'g', 'y', 'h', 'u', 'j', 'k'];

// poll for input from the terminal and resolve keys and mouse actions into
// semantic inputevents for the middle layer
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(handle_key(key.code, ts)),
        Event::Mouse(mouse) => Ok(handle_mouse(mouse, ts)),
        _ => Ok(vec![]),
    }
}

pub fn handle_key(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    match code {
        KeyCode::Esc => vec![InputEvent::Quit],
        KeyCode::Char(' ') => {
            if ts.playing {
                vec![InputEvent::Stop]
            } else {
                vec![InputEvent::Play]
            }
        }
        KeyCode::Delete | KeyCode::Char('0') => vec![InputEvent::Clear],

        // grid cursor, enter writes the selected note
        KeyCode::Up => { ts.move_cursor(-1, 0); vec![] }
        KeyCode::Down => { ts.move_cursor(1, 0); vec![] }
        KeyCode::Left => { ts.move_cursor(0, -1); vec![] }
        KeyCode::Right => { ts.move_cursor(0, 1); vec![] }
        KeyCode::Enter => vec![InputEvent::CellClick {
            track: ts.cursor_track,
            step: ts.cursor_step,
        }],

        // keyboard octave
        KeyCode::Char('z') => vec![InputEvent::OctaveChange(-1)],
        KeyCode::Char('x') => vec![InputEvent::OctaveChange(1)],

        // knobs: tab picks one, brackets turn it (shifted = coarse)
        KeyCode::Tab => { ts.cycle_knob(1); vec![] }
        KeyCode::BackTab => { ts.cycle_knob(-1); vec![] }
        KeyCode::Char('[') => nudge_knob(-1.0, ts),
        KeyCode::Char(']') => nudge_knob(1.0, ts),
        KeyCode::Char('{') => nudge_knob(-10.0, ts),
        KeyCode::Char('}') => nudge_knob(10.0, ts),

        // fader of the cursor track
        KeyCode::Char('<') => nudge_fader(ts.cursor_track, -FADER_STEP_DB, ts),
        KeyCode::Char('>') => nudge_fader(ts.cursor_track, FADER_STEP_DB, ts),
        KeyCode::Char('(') => nudge_pan(ts.cursor_track, -PAN_STEP, ts),
        KeyCode::Char(')') => nudge_pan(ts.cursor_track, PAN_STEP, ts),

        // fx: comma/period picks one, minus/equals moves it
        KeyCode::Char(',') => { ts.cycle_fx(-1); vec![] }
        KeyCode::Char('.') => { ts.cycle_fx(1); vec![] }
        KeyCode::Char('-') => nudge_fx(-1.0, ts),
        KeyCode::Char('=') => nudge_fx(1.0, ts),

        KeyCode::Char(c) => match PIANO_KEYS.iter().position(|&k| k == c) {
            Some(i) => vec![InputEvent::NoteSelect(Note::keyboard(ts.octave)[i])],
            None => vec![],
        },

        _ => vec![],
    }
}

pub fn handle_mouse(mouse: MouseEvent, ts: &mut TuiState) -> Vec<InputEvent> {
    let y = mouse.row as f32 * ROW_TRAVEL;
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => match ts.hits.at(mouse.column, mouse.row) {
            Some(Hit::Cell { track, step }) => {
                ts.cursor_track = track;
                ts.cursor_step = step;
                vec![InputEvent::CellClick { track, step }]
            }
            Some(Hit::Knob(controller)) => {
                if let Some(i) = ts.knobs.iter().position(|k| *k == controller) {
                    ts.selected_knob = i;
                }
                vec![InputEvent::KnobPointerDown {
                    pointer: MOUSE,
                    controller,
                    y,
                }]
            }
            Some(Hit::Key(note)) => vec![InputEvent::NoteSelect(note)],
            Some(Hit::Fx(kind)) => {
                ts.selected_fx = kind.index();
                vec![]
            }
            Some(Hit::Fader(track)) | Some(Hit::Pan(track)) => {
                ts.cursor_track = track;
                vec![]
            }
            None => vec![],
        },
        MouseEventKind::Drag(MouseButton::Left) => vec![InputEvent::KnobPointerMove { pointer: MOUSE, y }],
        MouseEventKind::Up(MouseButton::Left) => vec![InputEvent::KnobPointerUp { pointer: MOUSE }],

        // wheel over anything continuous nudges it
        MouseEventKind::ScrollUp | MouseEventKind::ScrollDown => {
            let dir = if mouse.kind == MouseEventKind::ScrollUp { 1.0 } else { -1.0 };
            match ts.hits.at(mouse.column, mouse.row) {
                Some(Hit::Knob(controller)) => vec![InputEvent::KnobDrag {
                    controller,
                    delta_y: dir * ROW_TRAVEL,
                }],
                Some(Hit::Fader(track)) => nudge_fader(track, dir * FADER_STEP_DB, ts),
                Some(Hit::Pan(track)) => nudge_pan(track, dir * PAN_STEP, ts),
                Some(Hit::Fx(kind)) => {
                    ts.selected_fx = kind.index();
                    nudge_fx(dir, ts)
                }
                _ => vec![],
            }
        }
        _ => vec![],
    }
}

fn nudge_knob(delta_y: f32, ts: &TuiState) -> Vec<InputEvent> {
    match ts.selected_knob() {
        Some(controller) => vec![InputEvent::KnobDrag { controller, delta_y }],
        None => vec![],
    }
}

fn nudge_fader(track: usize, delta_db: f32, ts: &TuiState) -> Vec<InputEvent> {
    match ts.volumes.get(track) {
        Some(current) => vec![InputEvent::FaderChange {
            track,
            volume_db: current + delta_db,
        }],
        None => vec![],
    }
}

fn nudge_pan(track: usize, delta: f32, ts: &TuiState) -> Vec<InputEvent> {
    match ts.pans.get(track) {
        Some(current) => vec![InputEvent::PanChange {
            track,
            pan: current + delta,
        }],
        None => vec![],
    }
}

fn nudge_fx(dir: f32, ts: &TuiState) -> Vec<InputEvent> {
    let kind = ts.selected_fx();
    let (min, max) = kind.range();
    let step = (max - min) / FX_STEPS;
    vec![InputEvent::FxParamChange {
        kind,
        value: ts.fx_values[kind.index()] + dir * step,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::EffectKind;
    use crate::pipeline::controller::ControllerId;
    use crossterm::event::KeyModifiers;
    use ratatui::layout::Rect;

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn space_toggles_play_and_stop() {
        let mut ts = TuiState::default();
        assert_eq!(handle_key(KeyCode::Char(' '), &mut ts), vec![InputEvent::Play]);
        ts.playing = true;
        assert_eq!(handle_key(KeyCode::Char(' '), &mut ts), vec![InputEvent::Stop]);
    }

    #[test]
    fn piano_row_follows_the_octave() {
        let mut ts = TuiState::default();
        let c3: Note = "C3".parse().unwrap();
        assert_eq!(handle_key(KeyCode::Char('a'), &mut ts), vec![InputEvent::NoteSelect(c3)]);
        ts.octave = 5;
        let c6: Note = "C6".parse().unwrap();
        assert_eq!(handle_key(KeyCode::Char('k'), &mut ts), vec![InputEvent::NoteSelect(c6)]);
    }

    #[test]
    fn enter_clicks_the_cursor_cell() {
        let mut ts = TuiState::default();
        handle_key(KeyCode::Down, &mut ts);
        handle_key(KeyCode::Right, &mut ts);
        assert_eq!(
            handle_key(KeyCode::Enter, &mut ts),
            vec![InputEvent::CellClick { track: 1, step: 1 }]
        );
    }

    #[test]
    fn brackets_nudge_the_selected_knob() {
        let mut ts = TuiState::default();
        handle_key(KeyCode::Tab, &mut ts);
        assert_eq!(
            handle_key(KeyCode::Char('}'), &mut ts),
            vec![InputEvent::KnobDrag {
                controller: ControllerId::MasterVolume,
                delta_y: 10.0
            }]
        );
    }

    #[test]
    fn fx_nudge_starts_from_the_synced_value() {
        let mut ts = TuiState::default();
        ts.fx_values[EffectKind::Reverb.index()] = 0.3;
        ts.selected_fx = EffectKind::Reverb.index();
        let events = handle_key(KeyCode::Char('='), &mut ts);
        let [InputEvent::FxParamChange { kind, value }] = events.as_slice() else {
            panic!("expected one fx change, got {events:?}");
        };
        assert_eq!(*kind, EffectKind::Reverb);
        assert!((value - 0.32).abs() < 1e-6);
    }

    #[test]
    fn parens_pan_the_cursor_track() {
        let mut ts = TuiState::default();
        ts.cursor_track = 2;
        ts.pans[2] = 0.5;
        let events = handle_key(KeyCode::Char(')'), &mut ts);
        let [InputEvent::PanChange { track, pan }] = events.as_slice() else {
            panic!("expected one pan change, got {events:?}");
        };
        assert_eq!(*track, 2);
        assert!((pan - 0.6).abs() < 1e-6);
    }

    #[test]
    fn mouse_drag_on_a_knob_is_a_pointer_gesture() {
        let mut ts = TuiState::default();
        ts.hits.push(Rect::new(20, 1, 9, 1), Hit::Knob(ControllerId::Bpm));

        let down = handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 22, 1), &mut ts);
        assert_eq!(
            down,
            vec![InputEvent::KnobPointerDown {
                pointer: MOUSE,
                controller: ControllerId::Bpm,
                y: 4.0
            }]
        );
        let drag = handle_mouse(mouse(MouseEventKind::Drag(MouseButton::Left), 22, 0), &mut ts);
        assert_eq!(drag, vec![InputEvent::KnobPointerMove { pointer: MOUSE, y: 0.0 }]);
        let up = handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), 30, 9), &mut ts);
        assert_eq!(up, vec![InputEvent::KnobPointerUp { pointer: MOUSE }]);
    }

    #[test]
    fn clicking_a_cell_moves_the_cursor_there() {
        let mut ts = TuiState::default();
        ts.hits.push(Rect::new(40, 8, 2, 1), Hit::Cell { track: 4, step: 9 });
        let events = handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 41, 8), &mut ts);
        assert_eq!(events, vec![InputEvent::CellClick { track: 4, step: 9 }]);
        assert_eq!((ts.cursor_track, ts.cursor_step), (4, 9));
        assert!(handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 0, 0), &mut ts).is_empty());
    }
}
