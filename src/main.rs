use alicloud_tables::alicloud::{format_api_error, Connection, Environment};
use alicloud_tables::config::ConnectionConfig;
use alicloud_tables::resource::{self, QueryContext};
use alicloud_tables::VERSION;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Query Alibaba Cloud resources as tables
#[derive(Parser, Debug)]
#[command(name = "alicloud-tables", version, about, long_about = None)]
struct Args {
    /// Connection config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every table
    Tables,
    /// Show the columns of a table
    Describe { table: String },
    /// Stream the rows of a table as JSON lines
    Query {
        table: String,

        /// Comma-separated columns to return (default: all)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Equality qualifier, `column=value`; repeatable
        #[arg(long = "where", value_parser = parse_qual)]
        quals: Vec<(String, String)>,

        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,

        /// Override the configured regions; repeatable
        #[arg(long)]
        region: Vec<String>,
    },
}

fn parse_qual(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected column=value, got '{}'", s)),
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("alicloud-tables {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("alicloud-tables").join("alicloud-tables.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".alicloud-tables").join("alicloud-tables.log");
    }
    PathBuf::from("alicloud-tables.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:?}", err);
            eprintln!("Error: {}", format_api_error(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Tables => list_tables(),
        Command::Describe { table } => describe(&table),
        Command::Query {
            table,
            columns,
            quals,
            limit,
            region,
        } => {
            let mut config = ConnectionConfig::load(args.config.as_deref())?;
            if !region.is_empty() {
                config.regions = region;
            }
            let ctx = QueryContext {
                columns,
                quals: quals.into_iter().collect(),
                limit,
            };
            query(config, &table, ctx).await
        }
    }
}

fn list_tables() -> Result<()> {
    let mut out = std::io::stdout().lock();
    for name in resource::get_all_table_names() {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

fn describe(name: &str) -> Result<()> {
    let table = resource::require_table(name)?;
    let mut out = std::io::stdout().lock();

    writeln!(out, "{} - {}", table.name, table.description)?;
    for column in &table.columns {
        writeln!(
            out,
            "  {:<32} {:<10} {}",
            column.name,
            format!("{:?}", column.column_type).to_lowercase(),
            column.description
        )?;
    }
    Ok(())
}

async fn query(config: ConnectionConfig, name: &str, ctx: QueryContext) -> Result<()> {
    let table = resource::require_table(name)?;
    let conn = Connection::new(config, Environment::from_process())?;

    let (tx, mut rx) = mpsc::channel::<resource::Row>(64);
    let printer = tokio::spawn(async move {
        let mut out = std::io::stdout();
        while let Some(row) = rx.recv().await {
            let line = serde_json::to_string(&row)?;
            if writeln!(out, "{}", line).is_err() {
                // stdout closed (e.g. piped into head)
                break;
            }
        }
        Ok::<_, anyhow::Error>(())
    });

    let result = resource::execute(&conn, table, &ctx, tx).await;
    printer.await.context("Row printer panicked")??;
    let rows = result?;

    tracing::info!("{} rows from {}", rows, name);
    Ok(())
}
