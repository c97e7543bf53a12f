//! Phase Oracle Scanner CLI
//!
//! Calibration and blind price-phase analysis over indexed chain data.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phase_oracle::{
    round::trailing_zeros, AccuracyClassifier, Decomposer, PhaseTolerance, PriceContext,
    RoundDetector, RoundTables,
};
use phase_oracle_scanner::{
    analyzer::PeriodAnalyzer,
    config::ScannerConfig,
    loader::{HttpSeriesSource, RangeDataLoader},
    output::{create_handler, OutputHandler},
    series::Period,
};

#[derive(Parser)]
#[command(name = "phase-oracle-scanner")]
#[command(about = "Price-phase inference and accuracy classification over on-chain amounts")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "scanner.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a calendar month or a range of days
    Analyze {
        /// Calendar month (YYYY-MM)
        #[arg(long, conflicts_with_all = ["from", "to"], required_unless_present = "from")]
        month: Option<String>,

        /// First day (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<String>,

        /// Pretty-print JSON on stdout
        #[arg(long)]
        pretty: bool,
    },

    /// Decompose one amount and, given a price, classify it
    Decompose {
        /// Amount in satoshis
        amount: u64,

        /// Price (or low of the day's range) in USD
        #[arg(long)]
        low: Option<f64>,

        /// High of the day's range in USD
        #[arg(long, requires = "low")]
        high: Option<f64>,
    },

    /// Validate configuration file
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    // Load configuration
    let config = match ScannerConfig::from_file(&cli.config) {
        Ok(c) => c,
        Err(e) => match cli.command {
            Commands::ValidateConfig => {
                eprintln!("Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            Commands::Decompose { .. } if !cli.config.exists() => {
                tracing::debug!("No config at {:?}, using defaults", cli.config);
                ScannerConfig::default()
            }
            _ => anyhow::bail!("Failed to load config from {:?}: {}", cli.config, e),
        },
    };

    match cli.command {
        Commands::Analyze {
            month,
            from,
            to,
            pretty,
        } => {
            let period = match (month, from, to) {
                (Some(month), _, _) => Period::parse_month(&month)?,
                (None, Some(from), Some(to)) => {
                    Period::days(Period::parse_date(&from)?, Period::parse_date(&to)?)?
                }
                _ => anyhow::bail!("either --month or --from/--to is required"),
            };
            run_analysis(&config, &period, pretty).await
        }
        Commands::Decompose { amount, low, high } => decompose(&config, amount, low, high),
        Commands::ValidateConfig => {
            println!("Configuration is valid.");
            println!("  Endpoint: {}", config.endpoint);
            println!(
                "  Chunk size: {} (max {} retries, {} ms base delay)",
                config.chunk_size, config.max_retries, config.retry_delay_ms
            );
            println!("  Include coinbase: {}", config.include_coinbase);
            println!(
                "  Search: resolution {}, tolerance {}",
                config.oracle.search.resolution, config.oracle.search.tolerance
            );
            println!(
                "  Calibration: {} bins, dust floor ${}",
                config.oracle.calibration.bin_resolution,
                config.oracle.calibration.dust_value_floor
            );
            println!("  Output mode: {:?}", config.output_mode);
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

async fn run_analysis(config: &ScannerConfig, period: &Period, pretty: bool) -> Result<()> {
    tracing::info!("Connecting to indexer at {}", config.endpoint);

    let source = HttpSeriesSource::from_config(config)?;
    let loader = RangeDataLoader::from_config(source, config);
    let analyzer = PeriodAnalyzer::new(&loader, config.oracle, config.include_coinbase);

    let handler: Box<dyn OutputHandler> = if pretty && config.output_path.is_none() {
        Box::new(phase_oracle_scanner::output::StdoutHandler::pretty())
    } else {
        create_handler(&config.output_mode, config.output_path.as_deref())?
    };

    let report = match analyzer.analyze(period).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Aborted {}: {}", period.label(), e);
            return Err(e.into());
        }
    };

    handler.handle(&report).await?;
    handler.flush().await?;
    Ok(())
}

fn decompose(config: &ScannerConfig, amount: u64, low: Option<f64>, high: Option<f64>) -> Result<()> {
    let tables = RoundTables::shared();
    let decomposer = Decomposer::from_config(&config.oracle.decomposer);
    let detector = RoundDetector::from_config(tables, &config.oracle);

    println!("Amount: {} sats", amount);
    let Some(log_phase) = decomposer.decompose(amount) else {
        println!(
            "  Outside the decomposable range [{}, {}]",
            decomposer.floor(),
            decomposer.ceiling()
        );
        return Ok(());
    };

    println!("  Log phase: {:.6}", log_phase.phase);
    println!("  Decade: {}", log_phase.decade);
    println!(
        "  Bin: {} of {}",
        log_phase.bin(config.oracle.calibration.bin_resolution),
        config.oracle.calibration.bin_resolution
    );
    println!("  Trailing zeros: {}", trailing_zeros(amount));
    println!("  Asset round: {}", detector.asset_round(amount));
    for tolerance in PhaseTolerance::ALL {
        println!(
            "  Currency round ({:?}): {}",
            tolerance,
            detector.currency_round(amount, tolerance)
        );
    }

    let context = match (low, high) {
        (Some(low), Some(high)) => PriceContext::range(low, high),
        (Some(price), None) => PriceContext::point(price),
        _ => return Ok(()),
    };
    if !context.is_valid() {
        anyhow::bail!("price must be positive with low <= high");
    }

    println!(
        "  Round in range (5%): {}",
        detector.currency_round_in_range(amount, &context, 0.05)
    );

    let mut classifier = AccuracyClassifier::new(config.oracle, tables);
    match classifier.classify(amount, Some(&context)) {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => println!("  Not classified (below the dust floor)"),
    }
    Ok(())
}
