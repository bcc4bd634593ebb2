use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use directories::ProjectDirs;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tally_ipc::Envelope;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod ipc;
mod persistence;
mod slide;
mod sync;
mod ui;

use app::{App, Bubble};
use ipc::server::ChannelEvent;
use persistence::Persistence;
use slide::View;
use ui::UiLayout;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let config = config::load_config()?;

    // Load or seed the device document.
    let app = match Persistence::load()? {
        Some(mut loaded) => {
            loaded.config = config;
            loaded
        }
        None => {
            let seeded = App::new(config);
            Persistence::save(&seeded)?;
            seeded
        }
    };

    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        if let Err(e) = ipc::server::start(event_tx, out_rx).await {
            error!("channel server failed: {e}");
        }
    });

    // The TUI loop is synchronous and owns the main thread; the
    // channel task lives on the runtime workers.
    let res = run_tui(app, event_rx, out_tx);
    if let Err(err) = &res {
        eprintln!("Error: {:?}", err);
    }
    res
}

fn run_tui(
    mut app: App,
    events: Receiver<ChannelEvent>,
    out: UnboundedSender<Envelope>,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.ensure_active_project();
    let res = run_app(&mut terminal, app, events, out);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    events: Receiver<ChannelEvent>,
    out: UnboundedSender<Envelope>,
) -> Result<()> {
    let epoch = Instant::now();
    let mut last_frame = Instant::now();

    loop {
        let now_ms = epoch.elapsed().as_millis() as u64;
        app.slide.step(now_ms);

        let elapsed = last_frame.elapsed();
        last_frame = Instant::now();
        let mut layout = UiLayout::default();
        terminal.draw(|f| layout = ui::draw(f, &mut app, elapsed))?;

        // Drain the channel queue and apply it as one batch, then
        // checkpoint once. Counter presses between checkpoints live
        // only in memory by design.
        let mut batch = Vec::new();
        while let Ok(channel_event) = events.try_recv() {
            match channel_event {
                ChannelEvent::Opened => {
                    app.channel_open = true;
                    // Cheap ask: the publisher only republishes if it
                    // is holding undelivered changes.
                    if out.send(Envelope::soft_resync()).is_err() {
                        warn!("channel task gone; cannot request resync");
                    }
                }
                ChannelEvent::Closed => app.channel_open = false,
                ChannelEvent::Message(envelope) => batch.push(envelope),
            }
        }
        if !batch.is_empty() {
            let outcome = sync::apply_batch(&mut app, batch);
            if outcome.active_removed {
                app.slide.animate(View::Picker, now_ms);
            }
            if outcome.changed {
                if let Err(e) = Persistence::save(&app) {
                    error!("checkpoint save failed: {e}");
                }
            }
        }

        if event::poll(Duration::from_millis(33))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key(&mut app, key.code, now_ms, &layout)
                }
                Event::Mouse(mouse) => handle_mouse(&mut app, mouse, now_ms),
                // Display-off analogue: flush the document.
                Event::FocusLost => {
                    if let Err(e) = Persistence::save(&app) {
                        error!("focus-loss save failed: {e}");
                    }
                }
                _ => {}
            }
        }

        if app.should_quit {
            Persistence::save(&app)?;
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, code: KeyCode, now_ms: u64, layout: &UiLayout) {
    match app.view {
        View::Project => match code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up | KeyCode::Char('k') => {
                if app.increment(1) {
                    app.notify_goal_reached();
                    if let Some(area) = layout.bubbles.get(2) {
                        app.trigger_goal_effect(*area);
                    }
                }
            }
            KeyCode::Char('-') | KeyCode::Down | KeyCode::Char('j') => {
                app.increment(-1);
            }
            KeyCode::Char('1') => select_bubble(app, Bubble::Global, layout),
            KeyCode::Char('2') => select_bubble(app, Bubble::RepeatProgress, layout),
            KeyCode::Char('3') => select_bubble(app, Bubble::RepeatCount, layout),
            KeyCode::Char('b') => {
                app.cycle_bubble();
                if let Some(project) = app.cur_project() {
                    let bubble = project.selected_bubble;
                    select_bubble(app, bubble, layout);
                }
            }
            KeyCode::Char('h') | KeyCode::Left => {
                app.view = View::Picker;
                app.slide.animate(View::Picker, now_ms);
            }
            _ => {}
        },
        View::Picker => match code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => app.picker_up(),
            KeyCode::Down | KeyCode::Char('j') => app.picker_down(),
            KeyCode::Enter => app.select_picker_entry(),
            KeyCode::Char('l') | KeyCode::Right => {
                if app.cur_project().is_some() {
                    app.view = View::Project;
                    app.slide.animate(View::Project, now_ms);
                }
            }
            _ => {}
        },
    }
}

fn select_bubble(app: &mut App, bubble: Bubble, layout: &UiLayout) {
    app.select_bubble(bubble);
    let index = match bubble {
        Bubble::Global => 0,
        Bubble::RepeatProgress => 1,
        Bubble::RepeatCount => 2,
    };
    if let Some(area) = layout.bubbles.get(index) {
        app.trigger_select_effect(*area);
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent, now_ms: u64) {
    // The drag gesture only exists on the project view; picker taps
    // are keyboard-driven.
    if app.view != View::Project {
        return;
    }
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => app.slide.drag_start(mouse.column as f32),
        MouseEventKind::Drag(MouseButton::Left) => app.slide.drag_move(mouse.column as f32),
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(view) = app.slide.drag_end(mouse.column as f32, now_ms) {
                app.view = view;
            }
        }
        _ => {}
    }
}

fn init_logging() -> Result<()> {
    // Stdout belongs to the TUI; logs go to a file in the data dir.
    let proj_dirs = ProjectDirs::from("com", "tally", "tally")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    let log_file = std::fs::File::create(data_dir.join("tally.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::sync::Arc::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}
