use anyhow::{anyhow, Result};
use norachat_core::{Config, Dispatcher};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

/// Log to a file: the terminal belongs to the TUI
fn init_logging() -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("norachat");
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("norachat.log");
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();

    Ok(log_path)
}

fn load_config() -> Config {
    let config = Config::load().unwrap_or_else(|err| {
        log::warn!("Failed to load config: {err:#}; using defaults");
        Config::default()
    });
    config.with_env_overrides()
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let log_path = init_logging()?;
    log::info!("Starting norachat v{} (log: {})", env!("CARGO_PKG_VERSION"), log_path.display());

    let config = load_config();
    let provider = config.provider();
    let model = config.model();
    log::info!("Using {} with model {}", provider.display_name(), model);

    // One client for the lifetime of the process
    let client = config.build_client();
    let dispatcher = Dispatcher::with_greeting(client, config.persona());
    let mut app = App::new(dispatcher, provider, model);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(app.conversation_updates());

    let result = run(&mut terminal, &mut app, &mut events).await;

    app.shutdown();
    tui::restore()?;
    log::info!("Exiting with {} messages in conversation", app.store().len());

    result
}
