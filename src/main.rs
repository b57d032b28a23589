use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod channel;
mod config;
mod controller;
mod domain;
mod format;
mod inputter;
mod model;
mod pane;
mod protocol;
mod timer;
mod trigger;
mod ui;

use app::App;
use config::{AppConfig, Args};
use domain::LPError;

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: &Args) -> Result<(), LPError> {
    // Everything that can fail on bad input happens before the terminal is taken over.
    let config = AppConfig::from_args(args)?;
    init_logging(&config)?;
    info!(
        "Starting livepane: request {} push {} panes {:?}",
        config.request_url,
        config.ws_url,
        config.panes.iter().map(|p| p.index.as_str()).collect::<Vec<_>>()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let app = App::new(&config)?;
        let mut terminal = ratatui::init();
        let result = app.run(&mut terminal).await;
        ratatui::restore();
        result
    })
}

fn init_logging(config: &AppConfig) -> Result<(), LPError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| LPError::Config(format!("logging: {e}")))
}
