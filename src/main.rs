use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dilemma_engine::api::state::AppState;
use dilemma_engine::config::AppConfig;
use dilemma_engine::engine::{AiStrategy, MatchRegistry};
use dilemma_engine::models::{Player, Slot, Stats};
use dilemma_engine::storage::{JsonlMatchStore, MemoryMatchStore, StorageConfig};
use dilemma_engine::transport::ChannelSink;
use dilemma_engine::trust::TrustScoreEngine;

#[derive(Parser)]
#[command(name = "dilemma-engine")]
#[command(about = "Match synchronization and scoring engine for the prisoner's dilemma")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,
    },

    /// Play an AI-vs-AI match and print the ledger
    Simulate {
        #[arg(long, default_value = "tit_for_tat")]
        strategy_a: AiStrategy,

        #[arg(long, default_value = "always_betray")]
        strategy_b: AiStrategy,

        /// Number of rounds (defaults to the configured max_rounds)
        #[arg(long)]
        rounds: Option<u32>,
    },

    /// Compute a trust score and matchmaking range from raw counters
    Trust {
        #[arg(long)]
        games: u32,

        #[arg(long)]
        cooperations: u32,

        #[arg(long)]
        betrayals: u32,
    },

    /// Load and validate the configuration file
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_result = AppConfig::load_or_default(&cli.config);
    let log_level = cli.log_level.clone().unwrap_or_else(|| {
        config_result
            .as_ref()
            .map(|c| c.log_level.clone())
            .unwrap_or_else(|_| "info".to_string())
    });

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting dilemma-engine v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config_result
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let store = JsonlMatchStore::open(StorageConfig::new(config.data_dir.clone()))
                .context("Failed to open match store")?;
            let state = AppState::new(&config, Arc::new(store));
            let app = dilemma_engine::api::build_router(state);

            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Simulate {
            strategy_a,
            strategy_b,
            rounds,
        } => {
            simulate(&config, strategy_a, strategy_b, rounds).await?;
        }
        Commands::Trust {
            games,
            cooperations,
            betrayals,
        } => {
            let engine = TrustScoreEngine::new(config.trust.clone(), config.leaderboard.clone());
            let stats = Stats {
                total_games: games,
                cooperations,
                betrayals,
                ..Stats::default()
            };
            let derived = engine.derive(&stats);
            let range = derived.matchmaking_range;

            println!("Trust score:       {}", derived.trust_score);
            println!(
                "Matchmaking range: {}..={} (half width {:.1})",
                range.min, range.max, range.half_width
            );
            match derived.cooperation_pct {
                Some(pct) => println!("Cooperation:       {:.1}%", pct),
                None => println!("Cooperation:       n/a (no decisions recorded)"),
            }
        }
        Commands::CheckConfig => {
            config.validate()?;
            println!("Configuration OK: {}", cli.config.display());
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn simulate(
    config: &AppConfig,
    strategy_a: AiStrategy,
    strategy_b: AiStrategy,
    rounds: Option<u32>,
) -> Result<()> {
    let mut match_config = config.match_defaults.clone();
    match_config.inter_round_delay_seconds = 0;
    if let Some(rounds) = rounds {
        match_config.max_rounds = rounds;
    }

    let (sink, _deliveries) = ChannelSink::new();
    let registry = MatchRegistry::new(
        match_config.clone(),
        Arc::new(TrustScoreEngine::new(
            config.trust.clone(),
            config.leaderboard.clone(),
        )),
        Arc::new(MemoryMatchStore::new()),
        Arc::new(sink),
    );

    let mut completions = registry.subscribe_completions();
    let players = [
        Player::ai_with("ai-a", strategy_a.to_string(), strategy_a),
        Player::ai_with("ai-b", strategy_b.to_string(), strategy_b),
    ];
    let match_id = registry.create_match(players, Some(match_config)).await?;
    tracing::info!(%match_id, %strategy_a, %strategy_b, "Simulating match");

    let finalized = completions
        .recv()
        .await
        .context("Match finished without a result")?;
    let record = &finalized.record;

    println!("Match {} ({})", record.id, record.reason);
    println!("{:>5}  {:<10} {:<10} {:>7}", "round", "A", "B", "points");
    for round in record.resolved_rounds() {
        let choice = |slot: Slot| {
            round
                .decision(slot)
                .map(|d| d.choice.to_string())
                .unwrap_or_default()
        };
        println!(
            "{:>5}  {:<10} {:<10} {:>3}-{:<3}",
            round.number,
            choice(Slot::A),
            choice(Slot::B),
            round.points(Slot::A),
            round.points(Slot::B)
        );
    }
    println!(
        "Final: {} {} - {} {}",
        record.player_a.display_name,
        record.final_scores.a,
        record.final_scores.b,
        record.player_b.display_name
    );
    match &record.winner {
        Some(winner) => println!("Winner: {}", winner),
        None => println!("Draw"),
    }

    for summary in &finalized.summaries {
        let tags: Vec<String> = summary.tags.iter().map(|t| t.to_string()).collect();
        println!(
            "{}: {:.0}% cooperate, {} points, tags [{}]",
            summary.player_id,
            summary.cooperation_pct,
            summary.total_points,
            tags.join(", ")
        );
    }

    Ok(())
}
