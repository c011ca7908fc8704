use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tablut::client::Client;
use tablut::engine::{Agent, EngineConfig};
use tablut::gamelog::GameLog;
use tablut::piece::Color;
use tablut::scorer::{ConvScorer, MaterialScorer, Scorer};

/// Play one game against a Tablut match server.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Side to play: "white" or "black".
    color: String,
    /// Per-move timeout announced by the server, in seconds.
    timeout: u64,
    /// Match server host.
    host: String,
    /// Player name announced on connect.
    #[arg(long, default_value = "nova")]
    name: String,
    /// Path to the positional model artifact.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Directory for ASCII game records.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let color = match args.color.to_lowercase().as_str() {
        "white" => Color::White,
        "black" => Color::Black,
        other => {
            error!("if you play, you are either white or black (got {other:?})");
            return ExitCode::from(2);
        }
    };
    info!(
        "tablut {} (built {}) playing {:?}",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIMESTAMP"),
        color
    );

    let scorer: Box<dyn Scorer> = match &args.model {
        Some(path) => match ConvScorer::load(path) {
            Ok(model) => {
                info!(model = %path.display(), "loaded positional model");
                Box::new(model)
            }
            Err(err) => {
                warn!("model unavailable ({err}), falling back to the material heuristic");
                Box::new(MaterialScorer)
            }
        },
        None => Box::new(MaterialScorer),
    };

    let config = EngineConfig {
        time_budget: Some(Duration::from_secs(args.timeout)),
        ..EngineConfig::default()
    };
    let mut agent = Agent::new(color, scorer, config);

    let log = args.log_dir.as_deref().and_then(|dir| {
        let tag = match color {
            Color::White => "white",
            Color::Black => "black",
        };
        match GameLog::create(dir, tag) {
            Ok(log) => {
                info!(path = %log.path().display(), "recording game");
                Some(log)
            }
            Err(err) => {
                warn!("cannot create game record: {err}");
                None
            }
        }
    });

    let mut client = match Client::connect(&args.host, color, &args.name, log) {
        Ok(client) => client,
        Err(err) => {
            error!("connection failed: {err}");
            return ExitCode::from(1);
        }
    };

    match client.play(&mut agent) {
        Ok(result) => {
            match result.winner() {
                Some(winner) if winner == color => info!("we won"),
                Some(_) => info!("we lost"),
                None => info!("draw"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("game aborted: {err}");
            ExitCode::from(1)
        }
    }
}
