//! Futu Grid Trading - Main Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futu_grid_trading::bot::GridBot;
use futu_grid_trading::config::{Config, LoggingConfig};
use futu_grid_trading::exchange::GatewayClient;
use futu_grid_trading::strategy::{ExecutionSettings, GridTradingStrategy, OrderExecutor};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Futu Grid Trading CLI
#[derive(Parser)]
#[command(name = "futu-grid-trading")]
#[command(version, about = "Grid trading of an equity hedged with its inverse equity")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop (default)
    Run {
        /// Log orders without submitting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the grid lines and per-grid position sizes
    Grid,

    /// Print the order plan for a price and current holdings
    Quote {
        /// Equity price
        #[arg(short, long)]
        price: Decimal,

        /// Current equity position
        #[arg(long, default_value = "0")]
        position: i64,

        /// Current inverse equity position
        #[arg(long, default_value = "0")]
        inverse_position: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Some(Commands::Grid) => {
            init_console_logging(&config.logging)?;
            return show_grid(&config);
        }
        Some(Commands::Quote {
            price,
            position,
            inverse_position,
        }) => {
            init_console_logging(&config.logging)?;
            return show_quote(&config, price, position, inverse_position);
        }
        Some(Commands::Run { dry_run }) => {
            config.runtime.dry_run |= dry_run;
        }
        None => {
            // Default: run trading loop
        }
    }

    config.validate()?;
    let _guard = init_logging(&config.logging)?;

    info!(
        "Futu grid trading v{} started",
        env!("CARGO_PKG_VERSION")
    );
    if config.runtime.dry_run {
        info!("Dry run is on, orders will be logged but not submitted");
    } else {
        warn!("Live trading, orders will be submitted");
    }
    log_config(&config);

    let strategy = GridTradingStrategy::new(&config.grid_trading_strategy)?;
    let client = GatewayClient::new(&config.gateway)?;
    if !config.runtime.dry_run {
        client
            .unlock_trade(&config.gateway.unlock_password)
            .await
            .context("Failed to unlock trading")?;
    }

    let executor = OrderExecutor::new(ExecutionSettings::from(&config.runtime));
    let mut bot = GridBot::new(
        Arc::new(client),
        strategy,
        executor,
        config.instruments.clone(),
        &config.runtime,
    );

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    bot.run(shutdown).await?;

    info!("Futu grid trading shutdown complete");
    Ok(())
}

fn env_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("Invalid log level '{}'", logging.level)),
    }
}

/// Log to stdout and to a file rotated at midnight.
fn init_logging(logging: &LoggingConfig) -> Result<WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all(&logging.directory).with_context(|| {
        format!(
            "Failed to create log directory {}",
            logging.directory.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(&logging.directory, &logging.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging)?)
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .init();

    Ok(guard)
}

fn init_console_logging(logging: &LoggingConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging)?)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let grid = &config.grid_trading_strategy;
    info!("Configuration:");
    info!(
        "   Grid: {} - {} in {} grids",
        grid.grid_lower_limit_price, grid.grid_upper_limit_price, grid.grid_count
    );
    info!(
        "   Equity: {} up to {} shares (lot {}), price adjust {}",
        config.instruments.symbol,
        grid.grid_lower_limit_position,
        grid.lot_size,
        config.instruments.price_adjust
    );
    info!(
        "   Inverse equity: {} up to {} shares (lot {}), price adjust {}",
        config.instruments.inverse_symbol,
        grid.inverse_equity_max_position,
        grid.inverse_lot_size,
        config.instruments.inverse_price_adjust
    );
    info!("   Gateway: {}", config.gateway.base_url);
    info!(
        "   Poll interval: {}s, fill timeout: {}s",
        config.runtime.poll_interval_secs, config.runtime.order_fill_timeout_secs
    );
}

fn show_grid(config: &Config) -> Result<()> {
    let strategy = GridTradingStrategy::new(&config.grid_trading_strategy)?;
    let grid = strategy.grid();

    println!("grid_count: {}", grid.grid_count());
    println!("step: {}", grid.step());
    println!(
        "position_per_grid: {} {}",
        strategy.position_per_grid(),
        config.instruments.symbol
    );
    println!(
        "inverse_position_per_grid: {} {}",
        strategy.inverse_position_per_grid(),
        config.instruments.inverse_symbol
    );
    println!();
    println!("{:>5}  {:>10}  {:>10}  {:>10}", "index", "from", "equity", "inverse");
    for index in 0..=grid.grid_count() + 1 {
        let above = match index {
            0 => "-".to_string(),
            i => grid.lines()[i as usize - 1].to_string(),
        };
        let band = strategy.band(index);
        let inverse = strategy.inverse_target(band.min);
        println!("{:>5}  {:>10}  {:>10}  {:>10}", index, above, band.min, inverse);
    }
    Ok(())
}

fn show_quote(config: &Config, price: Decimal, position: i64, inverse_position: i64) -> Result<()> {
    let strategy = GridTradingStrategy::new(&config.grid_trading_strategy)?;
    let plan = strategy.resolve(price, position, inverse_position);

    println!("grid_index: {}", plan.grid_index);
    println!("band: [{}, {}]", plan.band.min, plan.band.max);
    println!("target_position: {}", plan.target_position);
    println!("order_quantity: {}", plan.order_quantity);
    println!("inverse_grid_index: {}", plan.inverse_grid_index);
    println!("inverse_target_position: {}", plan.inverse_target_position);
    println!("inverse_order_quantity: {}", plan.inverse_order_quantity);
    for leg in plan.orders() {
        println!("order: {} {} {}", leg.side, leg.quantity, leg.instrument);
    }
    Ok(())
}
