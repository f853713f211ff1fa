// The middle layer. It owns every bit of sequencer and parameter state; the tui
// only feeds it `InputEvent`s and draws whatever `display_state()` says, and the
// audio side only ever sees the `AudioCommand`s it hands back.
//
// All of this lives on the control thread behind `&mut self`. The only thing
// that crosses to the audio thread is the command stream.

use tracing::{debug, info};

use crate::audio_api::{AudioCommand, EnvelopeStage};
use crate::config::Config;
use crate::pipeline::controller::{ControllerBank, ControllerId};
use crate::pipeline::effects::EffectKind;
use crate::pipeline::pattern::PatternGrid;
use crate::pipeline::sequencer::{NOTE_BEATS, Sequencer};
use crate::pipeline::session::Session;
use crate::pipeline::transport::Transport;
use crate::pipeline::voices::VoiceRegistry;
use crate::shared::{CoreEvent, DisplayState, InputEvent, Note, ParamTarget, TrackDisplay};

// picking a key on the keyboard plays it on AETHER for a quarter note
pub const AUDITION_TRACK: usize = 1;
pub const AUDITION_BEATS: f64 = 1.0;

pub struct Middle {
    pattern: PatternGrid,
    voices: VoiceRegistry,
    session: Session,
    sequencer: Sequencer,
    transport: Transport,
    controllers: ControllerBank,
    events: Vec<CoreEvent>,
    now: f64, // audio time as of the last tick()
}

impl Middle {
    pub fn new(config: &Config) -> Self {
        let transport = Transport::new(config.bpm, config.lookahead_secs());
        let master = ControllerId::MasterVolume.range().apply(config.master_volume_db, 0.0);
        Self {
            pattern: PatternGrid::new(),
            voices: VoiceRegistry::build(),
            session: Session::new(transport.bpm(), master),
            sequencer: Sequencer::new(),
            transport,
            controllers: ControllerBank::new(),
            events: Vec::new(),
            now: 0.0,
        }
    }

    // the full state the audio side needs to mirror, for a freshly opened device
    pub fn startup_commands(&self) -> Vec<AudioCommand> {
        let mut cmds = Vec::new();
        self.voices.startup_commands(&mut cmds);
        cmds.push(AudioCommand::SetMasterVolume {
            db: self.session.master_volume_db,
        });
        cmds
    }

    #[cfg(test)]
    pub fn is_playing(&self) -> bool {
        self.sequencer.is_running()
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Vec<AudioCommand> {
        let mut cmds = Vec::new();
        match event {
            InputEvent::CellClick { track, step } => self.toggle_cell(track, step),
            InputEvent::NoteSelect(note) => self.select_note(note, &mut cmds),
            InputEvent::OctaveChange(delta) => {
                if self.session.shift_octave(delta) {
                    debug!(octave = self.session.octave, "octave changed");
                }
            }
            InputEvent::Play => self.play(),
            InputEvent::Stop => self.stop(),
            InputEvent::Clear => self.clear(),
            InputEvent::FaderChange { track, volume_db } => match self.voices.set_volume(track, volume_db, &mut cmds) {
                Ok(value) => self.notify_param(ParamTarget::TrackVolume(track), value),
                Err(e) => debug!("fader ignored: {e}"),
            },
            InputEvent::PanChange { track, pan } => match self.voices.set_pan(track, pan, &mut cmds) {
                Ok(value) => self.notify_param(ParamTarget::TrackPan(track), value),
                Err(e) => debug!("pan ignored: {e}"),
            },
            InputEvent::KnobDrag { controller, delta_y } => self.apply_knob(controller, delta_y, &mut cmds),
            InputEvent::KnobPointerDown { pointer, controller, y } => {
                if !self.controllers.pointer_down(pointer, controller, y) {
                    debug!(?pointer, ?controller, "knob press refused");
                }
            }
            InputEvent::KnobPointerMove { pointer, y } => {
                if let Some((controller, delta)) = self.controllers.pointer_move(pointer, y) {
                    self.apply_knob(controller, delta, &mut cmds);
                }
            }
            InputEvent::KnobPointerUp { pointer } => {
                self.controllers.pointer_up(pointer);
            }
            InputEvent::FxParamChange { kind, value } => {
                let value = self.voices.set_effect_param(kind, value, &mut cmds);
                self.notify_param(ParamTarget::Effect(kind), value);
            }
            InputEvent::Quit => {}
        }
        cmds
    }

    // Run every transport tick that is due by `now` (plus lookahead). Each tick
    // sees the pattern exactly as it stands when the tick is processed.
    pub fn tick(&mut self, now: f64) -> Vec<AudioCommand> {
        self.now = now;
        let mut cmds = Vec::new();
        for at in self.transport.poll(now) {
            let duration = self.transport.beats(NOTE_BEATS);
            if let Some(step) = self
                .sequencer
                .tick(at, duration, &self.pattern, &self.voices, &mut cmds)
            {
                self.events.push(CoreEvent::CurrentStepChanged(Some(step)));
            }
        }
        cmds
    }

    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            cells: *self.pattern.rows(),
            playing: self.sequencer.is_running(),
            playhead: self.sequencer.playhead(),
            bpm: self.session.bpm,
            master_volume_db: self.session.master_volume_db,
            selected_note: self.session.selected_note,
            octave: self.session.octave,
            tracks: self
                .voices
                .tracks()
                .iter()
                .map(|t| TrackDisplay {
                    name: t.name,
                    kind_label: t.instrument.kind().label(),
                    default_note: t.default_note,
                    volume_db: t.mix.volume_db,
                    pan: t.mix.pan,
                    envelope: t.instrument.envelope(),
                })
                .collect(),
            effects: EffectKind::ALL.map(|k| (k, self.voices.effect_param(k))),
            dragging: self.controllers.dragging(),
        }
    }

    fn toggle_cell(&mut self, track: usize, step: usize) {
        match self.pattern.toggle_cell(track, step, self.session.selected_note) {
            Ok(note) => self.events.push(CoreEvent::CellStateChanged { track, step, note }),
            Err(e) => debug!("cell click ignored: {e}"),
        }
    }

    fn select_note(&mut self, note: Note, cmds: &mut Vec<AudioCommand>) {
        self.session.selected_note = note;
        let duration = self.transport.beats(AUDITION_BEATS);
        if let Err(e) = self.voices.trigger(AUDITION_TRACK, note, self.now, duration, cmds) {
            debug!("audition skipped: {e}");
        }
    }

    fn play(&mut self) {
        if self.sequencer.start() {
            self.transport.start(self.now);
            info!(playhead = self.sequencer.playhead(), "playing");
        }
    }

    // stop is stop-and-rewind; scheduled notes ring out on their own
    fn stop(&mut self) {
        self.sequencer.stop();
        self.transport.stop();
        self.events.push(CoreEvent::CurrentStepChanged(None));
        info!("stopped");
    }

    fn clear(&mut self) {
        let filled: Vec<_> = self.pattern.filled().collect();
        self.pattern.clear_all();
        for (track, step, _) in filled {
            self.events.push(CoreEvent::CellStateChanged { track, step, note: None });
        }
        info!("pattern cleared");
    }

    fn read_param(&self, controller: ControllerId) -> Option<f32> {
        match controller {
            ControllerId::Bpm => Some(self.session.bpm),
            ControllerId::MasterVolume => Some(self.session.master_volume_db),
            ControllerId::Envelope { track, stage } => self.voices.envelope(track).ok().map(|env| env.get(stage)),
        }
    }

    fn apply_knob(&mut self, controller: ControllerId, delta_y: f32, cmds: &mut Vec<AudioCommand>) {
        let Some(current) = self.read_param(controller) else {
            debug!(?controller, "knob has no target");
            return;
        };
        let value = controller.range().apply(current, delta_y);

        match controller {
            ControllerId::Bpm => {
                self.session.bpm = self.transport.set_bpm(value);
                self.notify_param(ParamTarget::Bpm, self.session.bpm);
            }
            ControllerId::MasterVolume => {
                self.session.master_volume_db = value;
                cmds.push(AudioCommand::SetMasterVolume { db: value });
                self.notify_param(ParamTarget::MasterVolume, value);
            }
            ControllerId::Envelope { track, stage } => self.set_envelope_stage(track, stage, value, cmds),
        }
    }

    fn set_envelope_stage(&mut self, track: usize, stage: EnvelopeStage, value: f32, cmds: &mut Vec<AudioCommand>) {
        let result = self
            .voices
            .envelope(track)
            .and_then(|env| self.voices.set_envelope(track, env.with(stage, value), cmds));
        match result {
            Ok(env) => self.notify_param(ParamTarget::Envelope { track, stage }, env.get(stage)),
            Err(e) => debug!("envelope knob ignored: {e}"),
        }
    }

    fn notify_param(&mut self, target: ParamTarget, value: f32) {
        self.events.push(CoreEvent::ParameterChanged { target, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::controller::PointerId;
    use crate::shared::{STEP_COUNT, TRACK_COUNT};

    fn note(s: &str) -> Note {
        s.parse().unwrap()
    }

    // default config: 120 bpm, 100 ms lookahead
    fn middle() -> Middle {
        Middle::new(&Config::default())
    }

    fn triggers(cmds: &[AudioCommand]) -> Vec<&AudioCommand> {
        cmds.iter().filter(|c| c.scheduled_at().is_some()).collect()
    }

    #[test]
    fn seven_by_thirty_two_single_trigger_scenario() {
        let mut m = middle();
        m.handle_input(InputEvent::CellClick { track: 1, step: 0 });
        m.tick(3.0);
        m.handle_input(InputEvent::Play);

        let cmds = m.tick(3.0);
        let half_note = 1.0; // 2 beats at 120 bpm
        assert_eq!(
            triggers(&cmds),
            vec![&AudioCommand::Trigger {
                track: 1,
                note: note("C3"),
                at: 3.0,
                duration: half_note
            }]
        );
        assert!(m.drain_events().contains(&CoreEvent::CurrentStepChanged(Some(0))));
    }

    #[test]
    fn cell_click_uses_selected_note_and_replaces() {
        let mut m = middle();
        m.handle_input(InputEvent::NoteSelect(note("C2")));
        m.handle_input(InputEvent::CellClick { track: 0, step: 5 });
        m.handle_input(InputEvent::CellClick { track: 0, step: 5 });
        assert_eq!(m.display_state().cells[0][5], None);

        m.handle_input(InputEvent::CellClick { track: 0, step: 5 });
        m.handle_input(InputEvent::NoteSelect(note("G2")));
        m.handle_input(InputEvent::CellClick { track: 0, step: 5 });
        assert_eq!(m.display_state().cells[0][5], Some(note("G2")));

        let changes: Vec<_> = m
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, CoreEvent::CellStateChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn out_of_range_click_is_a_no_op() {
        let mut m = middle();
        m.handle_input(InputEvent::CellClick {
            track: TRACK_COUNT,
            step: STEP_COUNT,
        });
        assert!(m.drain_events().is_empty());
    }

    #[test]
    fn note_select_auditions_on_aether() {
        let mut m = middle();
        m.tick(2.0);
        let cmds = m.handle_input(InputEvent::NoteSelect(note("E3")));
        assert_eq!(
            cmds,
            vec![AudioCommand::Trigger {
                track: AUDITION_TRACK,
                note: note("E3"),
                at: 2.0,
                duration: 0.5
            }]
        );
        assert_eq!(m.display_state().selected_note, note("E3"));
    }

    #[test]
    fn stop_rewinds_and_clears_highlight() {
        let mut m = middle();
        m.handle_input(InputEvent::Play);
        for i in 0..10 {
            m.tick(i as f64 * 0.125);
        }
        assert_eq!(m.display_state().playhead, 10);
        m.drain_events();

        m.handle_input(InputEvent::Stop);
        assert_eq!(m.display_state().playhead, 0);
        assert!(!m.is_playing());
        assert_eq!(m.drain_events(), vec![CoreEvent::CurrentStepChanged(None)]);
        assert!(m.tick(5.0).is_empty());
    }

    #[test]
    fn clear_only_touches_the_pattern() {
        let mut m = middle();
        m.handle_input(InputEvent::CellClick { track: 2, step: 3 });
        m.handle_input(InputEvent::Play);
        m.tick(0.0);
        m.drain_events();

        m.handle_input(InputEvent::Clear);
        assert!(m.is_playing());
        assert_eq!(m.display_state().playhead, 1);
        assert!(m.display_state().cells.iter().flatten().all(|c| c.is_none()));
        assert_eq!(
            m.drain_events(),
            vec![CoreEvent::CellStateChanged {
                track: 2,
                step: 3,
                note: None
            }]
        );
    }

    #[test]
    fn bpm_knob_drag_clamps_at_220() {
        let mut m = middle();
        let mouse = PointerId(0);
        m.handle_input(InputEvent::KnobPointerDown {
            pointer: mouse,
            controller: ControllerId::Bpm,
            y: 500.0,
        });
        let mut y = 500.0;
        for _ in 0..40 {
            y -= 10.0;
            m.handle_input(InputEvent::KnobPointerMove { pointer: mouse, y });
            assert!(m.display_state().bpm <= 220.0);
        }
        assert_eq!(m.display_state().bpm, 220.0);
        m.handle_input(InputEvent::KnobPointerUp { pointer: mouse });

        // released: further motion does nothing
        m.handle_input(InputEvent::KnobPointerMove { pointer: mouse, y: 900.0 });
        assert_eq!(m.display_state().bpm, 220.0);
        assert!(m.display_state().dragging.is_empty());
    }

    #[test]
    fn bpm_knob_retimes_the_transport() {
        let mut m = middle();
        m.handle_input(InputEvent::KnobDrag {
            controller: ControllerId::Bpm,
            delta_y: -60.0,
        });
        assert_eq!(m.display_state().bpm, 60.0);
        m.handle_input(InputEvent::Play);
        m.tick(0.0);
        assert!(m.tick(0.1).is_empty()); // next tick is a quarter second out
        m.tick(0.25);
        let steps: Vec<_> = m
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                CoreEvent::CurrentStepChanged(step) => step,
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![0, 1]);
    }

    #[test]
    fn slowest_bpm_steps_once_per_sixteenth() {
        let mut m = middle();
        m.handle_input(InputEvent::KnobDrag {
            controller: ControllerId::Bpm,
            delta_y: -1000.0,
        });
        assert_eq!(m.display_state().bpm, 40.0);
        m.handle_input(InputEvent::Play);
        let mut now = 0.0;
        while now < 1.0 {
            m.tick(now);
            now += 0.016;
        }
        let steps: Vec<_> = m
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                CoreEvent::CurrentStepChanged(step) => step,
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![0, 1, 2]);
        assert_eq!(m.display_state().playhead, 3);
    }

    #[test]
    fn master_volume_knob_sends_to_audio() {
        let mut m = middle();
        let cmds = m.handle_input(InputEvent::KnobDrag {
            controller: ControllerId::MasterVolume,
            delta_y: 10.0,
        });
        assert_eq!(cmds, vec![AudioCommand::SetMasterVolume { db: -7.0 }]);
        let cmds = m.handle_input(InputEvent::KnobDrag {
            controller: ControllerId::MasterVolume,
            delta_y: 1e9,
        });
        assert_eq!(cmds, vec![AudioCommand::SetMasterVolume { db: 0.0 }]);
    }

    #[test]
    fn envelope_knob_writes_through_registry() {
        let mut m = middle();
        let sustain = ControllerId::Envelope {
            track: 2,
            stage: EnvelopeStage::Sustain,
        };
        let cmds = m.handle_input(InputEvent::KnobDrag {
            controller: sustain,
            delta_y: 1000.0,
        });
        let env = m.display_state().tracks[2].envelope;
        assert_eq!(env.sustain, 1.0);
        assert_eq!(cmds, vec![AudioCommand::SetEnvelope { track: 2, envelope: env }]);

        let attack = ControllerId::Envelope {
            track: 0,
            stage: EnvelopeStage::Attack,
        };
        let cmds = m.handle_input(InputEvent::KnobDrag {
            controller: attack,
            delta_y: -1e6,
        });
        let env = m.display_state().tracks[0].envelope;
        assert_eq!(env.attack, 0.01);
        assert_eq!(cmds, vec![AudioCommand::SetVoiceTemplate { track: 0, envelope: env }]);
    }

    #[test]
    fn fader_and_fx_are_clamped() {
        let mut m = middle();
        m.handle_input(InputEvent::FaderChange {
            track: 4,
            volume_db: 6.0,
        });
        assert_eq!(m.display_state().tracks[4].volume_db, 0.0);

        let cmds = m.handle_input(InputEvent::FxParamChange {
            kind: EffectKind::BitCrush,
            value: 40.0,
        });
        assert_eq!(
            cmds,
            vec![AudioCommand::SetEffectParam {
                kind: EffectKind::BitCrush,
                value: 16.0
            }]
        );

        assert!(m
            .handle_input(InputEvent::FaderChange {
                track: 42,
                volume_db: -3.0
            })
            .is_empty());
    }

    #[test]
    fn pan_change_moves_the_mix() {
        let mut m = middle();
        let cmds = m.handle_input(InputEvent::PanChange { track: 3, pan: -4.0 });
        assert_eq!(
            cmds,
            vec![AudioCommand::SetTrackMix {
                track: 3,
                volume_db: -18.0,
                pan: -1.0
            }]
        );
        assert_eq!(m.display_state().tracks[3].pan, -1.0);
        assert_eq!(
            m.drain_events(),
            vec![CoreEvent::ParameterChanged {
                target: ParamTarget::TrackPan(3),
                value: -1.0
            }]
        );
    }

    #[test]
    fn octave_change_is_bounded() {
        let mut m = middle();
        for _ in 0..10 {
            m.handle_input(InputEvent::OctaveChange(1));
        }
        assert_eq!(m.display_state().octave, 6);
        for _ in 0..10 {
            m.handle_input(InputEvent::OctaveChange(-1));
        }
        assert_eq!(m.display_state().octave, 1);
    }

    #[test]
    fn startup_includes_master_volume() {
        let m = middle();
        let cmds = m.startup_commands();
        assert_eq!(cmds.last(), Some(&AudioCommand::SetMasterVolume { db: -12.0 }));
    }
}
