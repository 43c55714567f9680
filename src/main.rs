mod api;
mod app;
mod bulk;
mod config;
mod error;
mod jobs;
mod matcher;
mod ui;
mod watchlist;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::app::App;
use crate::config::Config;
use crate::error::Result;

fn setup_logging() -> Result<()> {
    let data_dir = config::data_dir()?;
    std::fs::create_dir_all(&data_dir)?;

    let file_appender = tracing_appender::rolling::daily(&data_dir, "mangawatch.log");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("mangawatch=info".parse().unwrap()))
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // The TUI owns stdout, so logs go to a file
    if let Err(e) = setup_logging() {
        eprintln!("Warning: Could not set up logging: {}", e);
    }

    info!("Starting mangawatch");

    let config = Config::load()?;
    info!(
        backend = %config.backend_url(),
        threshold = config.matcher.threshold,
        "Loaded config"
    );

    let mut app = App::new(config)?;

    let mut terminal = app::init_terminal()?;
    let result = app.run(&mut terminal).await;
    app::restore_terminal()?;

    result
}
