mod app;
mod archive;
mod config;
mod deletion;
mod demo;
mod export;
mod fencing;
mod filter;
mod keys;
mod logging;
mod message;
mod query;
mod runtime;
mod search;
mod search_syntax;
mod ui;
mod view_state;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

use app::{App, AppEvent};
use archive::ArchiveEngine;
use keys::Key;
use query::QueryEngine;
use runtime::Runtime;
use ui::render::render;
use ui::widgets::UiState;

/// Spinner frame rate
const TICK_RATE: Duration = Duration::from_millis(80);

/// Terminal browser for an offline email archive
#[derive(Debug, Parser)]
#[command(name = "vaultterm", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Archive JSON file, overriding the config
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Browse a generated demo archive
    #[arg(long)]
    demo: bool,

    /// Verbose logging to the debug log
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    config::ensure_config_dir()?;
    logging::init(cli.debug, &logging::log_path()?)?;

    let config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };
    let engine = open_engine(&cli, &config)?;
    let data_dir = config.data_dir()?;
    let export_dir = config.export_dir()?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, engine, config.tuning(), data_dir, export_dir).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        error!("exiting with error: {e:#}");
    }
    result
}

fn open_engine(cli: &Cli, config: &config::Config) -> Result<Arc<dyn QueryEngine>> {
    if cli.demo {
        info!("using generated demo archive");
        return Ok(Arc::new(ArchiveEngine::new(demo::create_demo_archive())));
    }

    let path = match &cli.archive {
        Some(path) => path.clone(),
        None => config.archive_path()?,
    };
    if !path.exists() {
        anyhow::bail!(
            "Archive not found at {:?}.\n\
             Set archive_path in {:?} or pass --archive <path>.\n\
             Run with --demo to try the interface with generated data.",
            path,
            config::config_path()?
        );
    }
    let engine =
        ArchiveEngine::open(&path).with_context(|| format!("Failed to open archive {:?}", path))?;
    Ok(Arc::new(engine))
}

/// Forwards terminal input into the event channel. Runs until the receiver is dropped.
fn spawn_input_reader(tx: UnboundedSender<AppEvent>) {
    thread::spawn(move || {
        loop {
            let event = match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(event) => event,
                    Err(e) => {
                        error!("failed to read terminal event: {e}");
                        return;
                    }
                },
                Ok(false) => {
                    if tx.is_closed() {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    error!("failed to poll terminal: {e}");
                    return;
                }
            };
            let app_event = match event {
                Event::Key(key) => Key::from_event(key).map(AppEvent::Key),
                Event::Resize(_, height) => Some(AppEvent::Resize { height }),
                _ => None,
            };
            if let Some(app_event) = app_event
                && tx.send(app_event).is_err()
            {
                return;
            }
        }
    });
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    engine: Arc<dyn QueryEngine>,
    tuning: config::Tuning,
    data_dir: PathBuf,
    export_dir: PathBuf,
) -> Result<()> {
    let (tx, mut rx): (UnboundedSender<AppEvent>, UnboundedReceiver<AppEvent>) =
        mpsc::unbounded_channel();
    let runtime = Runtime::new(engine, tx.clone(), data_dir, export_dir);
    spawn_input_reader(tx);

    let mut app = App::new(tuning);
    let mut ui_state = UiState::new();
    app.resize(terminal.size()?.height);

    for effect in app.start() {
        runtime.execute(effect);
    }

    let mut ticker = tokio::time::interval(TICK_RATE);
    loop {
        terminal.draw(|f| render(f, &app, &ui_state))?;

        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                for effect in app.update(event) {
                    if !runtime.execute(effect) {
                        info!("quit requested");
                        return Ok(());
                    }
                }
            }
            _ = ticker.tick() => {
                ui_state.tick_spinner();
            }
        }

        if app.quitting {
            break;
        }
    }

    Ok(())
}
