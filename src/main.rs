//! CLI entry point for the travel-time comparison tool.
//!
//! Fetches travel times for a set of origin/destination pairs from the
//! TravelTime Routes API and its configured competitors, then reports how
//! closely each competitor tracks the baseline.

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use clap::Parser;
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use travel_time_rater::config::Mode;
use travel_time_rater::{analysis, collect, config, output, providers};

#[derive(Parser)]
#[command(name = "travel_time_rater")]
#[command(
    about = "Fetch and compare travel times from the TravelTime Routes API and its competitors",
    long_about = None
)]
struct Cli {
    /// Input CSV file path
    #[arg(long)]
    input: String,

    /// Output CSV file path
    #[arg(long)]
    output: String,

    /// Date (YYYY-MM-DD)
    #[arg(long)]
    date: String,

    /// Start time (HH:MM)
    #[arg(long)]
    start_time: String,

    /// End time (HH:MM)
    #[arg(long)]
    end_time: String,

    /// Interval in minutes
    #[arg(long)]
    interval: i64,

    /// Non-abbreviated time zone identifier, e.g. Europe/London
    #[arg(long)]
    time_zone_id: String,

    /// Path to your config file
    #[arg(long, default_value = "./config.json")]
    config: String,

    /// Transport mode requested from every provider
    #[arg(long, value_enum, default_value_t = Mode::Driving)]
    mode: Mode,

    /// Read already gathered data from the input file and skip data
    /// gathering. The input file must conform to the output file format.
    #[arg(long)]
    skip_data_gathering: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/travel_time_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("travel_time_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let api_providers = config::parse_config(&cli.config)?;
    let provider_names = api_providers.all_names();

    let pairs = output::read_location_pairs(&cli.input)?;
    if pairs.is_empty() {
        info!("Provided input file is empty. Exiting.");
        return Ok(());
    }

    let request_handlers = providers::initialize_request_handlers(&api_providers)?;

    let travel_times = if cli.skip_data_gathering {
        output::read_travel_times(&cli.input, &provider_names)?
    } else {
        let timezone: Tz = cli
            .time_zone_id
            .parse()
            .map_err(|e: chrono_tz::ParseError| anyhow!(e))
            .with_context(|| format!("Unknown time zone id `{}`", cli.time_zone_id))?;
        let start = collect::localize_datetime(&cli.date, &cli.start_time, timezone)?;
        let end = collect::localize_datetime(&cli.date, &cli.end_time, timezone)?;
        let time_instants = collect::generate_time_instants(start, end, cli.interval)?;

        collect::collect_travel_times(
            &pairs,
            &time_instants,
            &request_handlers,
            &provider_names,
            cli.mode,
            &cli.output,
        )
        .await?
    };

    let all_rows = travel_times.len();
    let filtered: Vec<_> = travel_times
        .into_iter()
        .filter(|record| record.has_all(&provider_names))
        .collect();

    if filtered.is_empty() {
        info!("All rows from the input file were skipped. Exiting.");
        return Ok(());
    }

    let skipped_rows = all_rows - filtered.len();
    if skipped_rows > 0 {
        info!(
            "Skipped {} rows ({:.2}%)",
            skipped_rows,
            100.0 * skipped_rows as f64 / all_rows as f64
        );
    }

    analysis::run_analysis(&filtered, &cli.output, 0.90, &api_providers)
}
