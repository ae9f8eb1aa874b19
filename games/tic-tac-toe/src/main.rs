mod graphics;
mod store;

use crate::graphics::{render_event, render_event_json};
use crate::store::JsonFileStore;
use backbone_lib::{Engine, EngineConfig, EngineHandle, UiEvent, UiRequest};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tic-tac-toe in the terminal, played locally, hosted for others or joined remotely.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The engine configuration. A missing file means defaults.
    #[arg(long, default_value = "TicTacToeConfig.json")]
    config: PathBuf,
    /// Where the game gets persisted.
    #[arg(long, default_value = "tictactoe_state.json")]
    store: PathBuf,
    /// Overrides the port from the configuration.
    #[arg(long)]
    port: Option<u16>,
    /// Prints every notification as one JSON line instead of drawing the board.
    #[arg(long)]
    json: bool,
}

const HELP: &str = "Commands: play:<0-8>, reset, resume, start-server, start-local, \
connect-remote:<host[:port]>, update-settings, stop";

#[tokio::main]
/// Activates tracing, loads the configuration and the stored game, then it runs the engine and feeds it
/// with the commands typed on stdin until `stop` or end of input.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tic_tac_toe=info,backbone_lib=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse();
    let mut config = match EngineConfig::load_or_default(&args.config).await {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "Configuration could not be loaded.");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    tracing::info!(?config, "Starting tic-tac-toe.");

    let store = JsonFileStore::open(&args.store);
    let (engine, handle) = Engine::new(config, store);
    // Subscribe before the engine runs, so the restored board is not missed.
    let events = handle.subscribe();
    let engine_task = tokio::spawn(engine.run());
    let render_task = tokio::spawn(render_logic(events, args.json));

    if !args.json {
        println!("{HELP}");
    }
    read_commands(&handle).await;

    if let Err(err) = engine_task.await {
        tracing::error!(?err, "Engine task failed.");
    }
    // The engine dropped its notifier, so the render task sees a closed channel.
    drop(handle);
    let _ = render_task.await;
}

/// Prints every notification until the engine is gone.
async fn render_logic(mut events: broadcast::Receiver<UiEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) if json => {
                if let Some(line) = render_event_json(&event) {
                    println!("{line}");
                }
            }
            Ok(event) => {
                if let Some(text) = render_event(&event) {
                    println!("{text}\n");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Display fell behind, skipping notifications.");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Parses stdin lines into requests. End of input stops the engine.
async fn read_commands(handle: &EngineHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let request = match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case("help") => {
                println!("{HELP}");
                continue;
            }
            Ok(Some(line)) => match line.parse::<UiRequest>() {
                Ok(request) => request,
                Err(err) => {
                    println!("{err}\n{HELP}");
                    continue;
                }
            },
            Ok(None) => UiRequest::Stop,
            Err(err) => {
                tracing::error!(?err, "Reading stdin failed.");
                UiRequest::Stop
            }
        };
        let stopping = request == UiRequest::Stop;
        if handle.send(request).await.is_err() {
            tracing::info!("Engine is gone.");
            return;
        }
        if stopping {
            return;
        }
    }
}
