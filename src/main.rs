mod audio;
mod audio_api;
mod config;
mod error;
mod middle;
mod pipeline;
mod shared;
mod tui;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;

use audio::AudioLink;
use config::Config;
use middle::Middle;
use shared::InputEvent;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = config::load(config_path.as_deref())?;
    init_logging(&config)?;
    info!(?config, "starting");

    terminal::enable_raw_mode()?;
    // Enable keyboard enhancement for real press/release detection.
    // Falls back gracefully if the terminal doesn't support it.
    let _ = crossterm::execute!(
        std::io::stdout(),
        EnableMouseCapture,
        crossterm::event::PushKeyboardEnhancementFlags(crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
    );
    let _guard = RawModeGuard; // auto drops when out of scope

    let mut middle = Middle::new(&config);
    let mut audio = AudioLink::new();
    audio.ensure_started(|| middle.startup_commands());

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let frame_time = Duration::from_millis(config.frame_ms.max(1));
    let started = Instant::now();
    let mut tui_state = tui::mode::TuiState::default();

    loop {
        let ds = middle.display_state();
        tui_state.sync(&ds);
        term.draw(|frame| {
            tui_state.hits = tui::view::render(frame, frame.area(), &ds, &tui_state, audio.is_online());
        })?;

        let events = tui::input::poll_input(frame_time, &mut tui_state)?;
        if !events.is_empty() {
            // a dead device gets another chance whenever the user does something
            audio.ensure_started(|| middle.startup_commands());
        }
        for event in events {
            if event == InputEvent::Quit {
                info!("quit");
                drop(term);
                return Ok(());
            }
            for cmd in middle.handle_input(event) {
                audio.send(cmd);
            }
        }

        // audio time when there's a device, wall time otherwise
        let now = audio.now().unwrap_or_else(|| started.elapsed().as_secs_f64());
        for cmd in middle.tick(now) {
            audio.send(cmd);
        }
        for event in middle.drain_events() {
            tui_state.on_core_event(&event);
        }
    }
}

// the terminal is in raw mode, so logs go to a file
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
        .with_context(|| format!("opening log file {}", config.log_path.display()))?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(config.log_level())
        .init();
    Ok(())
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PopKeyboardEnhancementFlags,
            DisableMouseCapture
        );
        let _ = terminal::disable_raw_mode();
    }
}
