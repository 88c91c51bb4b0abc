//! proximity-join: computes listing / point-of-interest distances inside a
//! radius and stores them idempotently in PostgreSQL.

mod output;
mod progress;

use clap::{Args, Parser, Subcommand};
use output::{Status, format_count, format_millis};
use progress::ProgressObserver;
use proximity_core::config::{Config, ConfigSchema, TelemetrySettings};
use proximity_core::error::{Error, exit_codes};
use proximity_core::retry::RetryConfig;
use proximity_join::{Orchestrator, RunSummary};
use proximity_store::{DistanceStore, PgStore, redact_url, schema};
use proximity_telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "proximity-join")]
#[command(about = "Grid-indexed proximity join between listings and points of interest")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, ensure the distance table exists and run the join
    Run(RunArgs),
    /// Print the DDL for the distance table
    Schema,
    /// Print the effective configuration and validation findings
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Search radius in meters
    #[arg(long)]
    max_distance: Option<f64>,

    /// Grid cell size in degrees
    #[arg(long)]
    grid_size: Option<f64>,

    /// Origins per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Pending rows that trigger a save
    #[arg(long)]
    save_batch_threshold: Option<usize>,

    /// Safety factor for the bounding-box check
    #[arg(long)]
    margin: Option<f64>,

    /// Worker threads (0 or 1 runs sequentially)
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Screen rows but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl RunArgs {
    fn apply(&self, schema: &mut ConfigSchema) {
        let join = &mut schema.join;
        if let Some(value) = self.max_distance {
            join.max_distance = value;
        }
        if let Some(value) = self.grid_size {
            join.grid_size = value;
        }
        if let Some(value) = self.chunk_size {
            join.chunk_size = value;
        }
        if let Some(value) = self.save_batch_threshold {
            join.save_batch_threshold = value;
        }
        if let Some(value) = self.margin {
            join.filter_margin_factor = value;
        }
        if let Some(value) = self.parallelism {
            join.parallelism = value;
        }
        if self.dry_run {
            join.dry_run = true;
        }
        if let Some(url) = self.database_url.as_ref().filter(|u| !u.trim().is_empty()) {
            schema.database.url = Some(url.clone());
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => std::process::exit(report_error(&e, false)),
    };

    if let Commands::Run(args) = &cli.command {
        args.apply(&mut config.schema);
    }

    if let Err(e) = init_telemetry(&cli, &config.schema.telemetry) {
        Status::warning(&format!("Logging not initialized: {e}"));
    }

    let exit_code = match &cli.command {
        Commands::Run(args) => run_join(&config, args, cli.json_logs),
        Commands::Schema => print_schema(&config),
        Commands::Config => show_config(&config),
    };

    std::process::exit(exit_code);
}

fn init_telemetry(cli: &Cli, settings: &TelemetrySettings) -> anyhow::Result<()> {
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };

    proximity_telemetry::init_with_config(TelemetryConfig {
        log_level,
        json: cli.json_logs || settings.json,
        show_target: cli.verbose,
        show_thread_ids: cli.verbose,
    })
}

fn run_join(config: &Config, args: &RunArgs, json_logs: bool) -> i32 {
    let validation = config.schema.validate();
    for warning in validation.warnings() {
        Status::warning(&warning.to_string());
    }
    if let Err(e) = validation.to_result() {
        return report_error(&e, args.json);
    }

    let Some(url) = config.schema.database.url.as_deref() else {
        let e = Error::invalid_config_value("database.url", "no connection string configured")
            .with_suggestion("Set DATABASE_URL, pass --database-url or add database.url to the config file");
        return report_error(&e, args.json);
    };

    let mut orchestrator = match Orchestrator::new(config.schema.join.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => return report_error(&e, args.json),
    };
    if !args.json && !args.no_progress && !json_logs {
        orchestrator = orchestrator.with_observer(ProgressObserver::new());
    }

    let retry = RetryConfig::from(&config.schema.database.retry);
    let mut store = match PgStore::connect(url, &config.schema.tables, retry) {
        Ok(store) => store,
        Err(e) => return report_error(&e, args.json),
    };
    if let Err(e) = store.ensure_schema() {
        return report_error(&Error::from(e).with_context("Creating the distance table"), args.json);
    }

    tracing::debug!(database = %redact_url(url), "Connected");

    let summary = match orchestrator.run(&mut store) {
        Ok(summary) => summary,
        Err(e) => return report_error(&e, args.json),
    };

    if let Ok(snapshot) = serde_json::to_string(&proximity_telemetry::metrics().snapshot()) {
        tracing::debug!(metrics = %snapshot, "Run metrics");
    }

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => return report_error(&Error::from(e), false),
        }
    } else {
        print_summary(&summary);
    }

    if summary.is_clean() {
        exit_codes::SUCCESS
    } else {
        exit_codes::FAILURE
    }
}

fn print_summary(summary: &RunSummary) {
    Status::header("Proximity join");
    Status::field("Origins", summary.origins);
    Status::field("Targets", summary.targets);
    if summary.invalid_targets > 0 {
        Status::field("Invalid targets", summary.invalid_targets);
    }
    if summary.duplicate_origins > 0 {
        Status::field("Duplicate origins", summary.duplicate_origins);
    }
    Status::field("Chunks", summary.chunks);
    Status::field("Candidates", summary.candidate_pairs);
    Status::field("Coarse rejected", summary.coarse_rejected);
    Status::field("Out of radius", summary.out_of_radius);
    Status::field("Already processed", summary.already_processed);
    Status::field("Matched", summary.matched);
    Status::field("Saved", summary.saved);
    if summary.conflicts > 0 {
        Status::field("Conflicts", summary.conflicts);
    }
    if summary.duplicates_dropped > 0 {
        Status::field("Duplicates dropped", summary.duplicates_dropped);
    }
    if summary.rejected() > 0 {
        Status::field("Rejected", summary.rejected());
    }
    Status::field("Elapsed", format_millis(summary.elapsed_ms));
    println!();

    if summary.dry_run {
        Status::info("Dry run: nothing was written");
    }
    if summary.cancelled {
        Status::warning(&format!("Cancelled during {}; saved rows are kept", summary.final_phase));
    }
    if summary.failed_batches > 0 {
        Status::error(&format!(
            "{} rolled back ({}); re-run to retry them",
            format_count(summary.failed_batches, "batch", "batches"),
            format_count(summary.failed_records, "row", "rows"),
        ));
    } else if summary.is_clean() {
        Status::success(&format!("{} saved", format_count(summary.saved, "pair", "pairs")));
    }
}

fn print_schema(config: &Config) -> i32 {
    if let Err(e) = config.schema.tables.validate().to_result() {
        return report_error(&e, false);
    }
    println!("{}", schema::create_table_sql(&config.schema.tables));
    exit_codes::SUCCESS
}

fn show_config(config: &Config) -> i32 {
    let mut shown = config.clone();
    if let Some(url) = shown.schema.database.url.as_mut() {
        *url = redact_url(url);
    }

    match &shown.path {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file found, using defaults"),
    }
    match shown.to_toml() {
        Ok(toml) => println!("{toml}"),
        Err(e) => return report_error(&e, false),
    }

    let validation = config.schema.validate();
    for warning in validation.warnings() {
        Status::warning(&warning.to_string());
    }
    for error in validation.errors() {
        Status::error(&error.to_string());
    }
    if validation.is_valid() {
        Status::success("Configuration is valid");
        exit_codes::SUCCESS
    } else {
        exit_codes::CONFIG_ERROR
    }
}

/// Prints `error` and returns its exit code.
fn report_error(error: &Error, json: bool) -> i32 {
    if json {
        match serde_json::to_string_pretty(&error.to_report()) {
            Ok(report) => println!("{report}"),
            Err(_) => Status::error(&error.to_string()),
        }
    } else {
        Status::error(&error.to_string());
    }

    tracing::error!(code = %error.code, "{}", error.message);
    error.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "proximity-join",
            "--verbose",
            "run",
            "--max-distance",
            "500",
            "--grid-size",
            "0.005",
            "-j",
            "4",
            "--dry-run",
            "--json",
        ])
        .unwrap();
        assert!(cli.verbose);

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut schema = ConfigSchema::default();
        args.apply(&mut schema);
        assert_eq!(schema.join.max_distance, 500.0);
        assert_eq!(schema.join.grid_size, 0.005);
        assert_eq!(schema.join.parallelism, 4);
        assert_eq!(schema.join.chunk_size, ConfigSchema::default().join.chunk_size);
        assert!(schema.join.dry_run);
        assert!(args.json);
    }

    #[test]
    fn test_blank_database_url_is_ignored() {
        let args = RunArgs {
            database_url: Some("  ".to_string()),
            max_distance: None,
            grid_size: None,
            chunk_size: None,
            save_batch_threshold: None,
            margin: None,
            parallelism: None,
            dry_run: false,
            json: false,
            no_progress: false,
        };
        let mut schema = ConfigSchema::default();
        schema.database.url = Some("postgres://localhost/realestate".to_string());
        args.apply(&mut schema);
        assert_eq!(schema.database.url.as_deref(), Some("postgres://localhost/realestate"));
    }

    #[test]
    fn test_config_errors_exit_with_config_code() {
        let e = Error::invalid_config_value("join.grid_size", "must be positive");
        assert_eq!(report_error(&e, false), exit_codes::CONFIG_ERROR);

        let e = Error::connection_failed("refused");
        assert_eq!(report_error(&e, false), exit_codes::FAILURE);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
