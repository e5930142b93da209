//! PGN annotation worker
//!
//! Replays one game from a PGN file through a UCI engine and prints the
//! annotated transcript (or a per-ply JSON report with `--json`).

use analysis_worker::channel::EngineChannel;
use analysis_worker::config::WorkerConfig;
use analysis_worker::uci::EngineSession;
use analysis_worker::ReplayDriver;
use anyhow::Context;
use chess_core::{pgn, Game};
use tracing::info;

struct CliArgs {
    pgn_path: String,
    game_index: usize,
    json: bool,
}

const USAGE: &str = "usage: analysis-worker <pgn-file> [--game N] [--json]";

/// Parse `<pgn-file> [--game N] [--json]` from CLI args
fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut pgn_path = None;
    let mut game_index = 1;
    let mut json = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--game" => {
                let value = args.next().context(USAGE)?;
                game_index = value
                    .parse()
                    .with_context(|| format!("--game expects a number, got '{value}'"))?;
            }
            "-h" | "--help" => anyhow::bail!(USAGE),
            _ if pgn_path.is_none() => pgn_path = Some(arg),
            _ => anyhow::bail!("unexpected argument '{arg}'\n{USAGE}"),
        }
    }

    Ok(CliArgs {
        pgn_path: pgn_path.context(USAGE)?,
        game_index,
        json,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args()?;
    let config = WorkerConfig::load()?;
    info!(
        stockfish_path = %config.stockfish_path,
        depth = config.search_depth,
        static_eval = config.static_eval,
        walk_order = %config.walk_order,
        "Worker config loaded"
    );

    let text = tokio::fs::read_to_string(&args.pgn_path)
        .await
        .with_context(|| format!("Failed to read {}", args.pgn_path))?;
    let game_text = pgn::select_game(&text, args.game_index)?;

    let options = config.engine_options();
    let search = EngineSession::open(
        "search",
        EngineChannel::spawn(&config.stockfish_path)?,
        &options,
        config.request_timeout,
    )
    .await?;
    let evaler = if config.static_eval {
        Some(
            EngineSession::open(
                "eval",
                EngineChannel::spawn(&config.stockfish_path)?,
                &options,
                config.request_timeout,
            )
            .await?,
        )
    } else {
        None
    };

    let mut driver = ReplayDriver::new(&search, evaler.as_ref(), config.replay_settings());
    let result = driver.run::<Game>(game_text).await;

    search.close().await;
    if let Some(evaler) = evaler {
        evaler.close().await;
    }

    let annotated = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&annotated)?);
    } else {
        println!("{}", annotated.transcript);
    }

    Ok(())
}
