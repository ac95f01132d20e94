//! mongo-scanner CLI - List the databases and collections of a MongoDB cluster
//!
//! Usage:
//!   mongo-scanner [--uri <uri>] databases [scan flags]
//!   mongo-scanner [--uri <uri>] collections <database> [scan flags]
//!   mongo-scanner [--uri <uri>] schema [scan flags]
//!
//! Examples:
//!   mongo-scanner databases --exclude-database admin --exclude-database /^test/
//!   mongo-scanner --connection production schema --exclude-system --exclude-empty
//!   mongo-scanner collections animals --format json

use clap::{Args, Parser, Subcommand, ValueEnum};
use mongo_scanner::config::{parse_exclusions, Settings};
use mongo_scanner::logging::init_logging;
use mongo_scanner::{DatabaseSchema, MongoDriver, ScanOptions, Scanner};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mongo-scanner")]
#[command(about = "List the databases and collections of a MongoDB cluster")]
#[command(version)]
struct Cli {
    /// Connection URI (overrides the config file)
    #[arg(long, global = true)]
    uri: Option<String>,

    /// Path to a config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named connection from the config file
    #[arg(short, long, global = true)]
    connection: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Log connection lifecycle events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List databases
    Databases {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// List the collections of a database
    Collections {
        /// Database to inspect
        database: String,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// List every database with its collections
    Schema {
        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[derive(Args, Clone, Default)]
struct ScanArgs {
    /// Database to exclude; `/regex/` for a pattern (repeatable)
    #[arg(long = "exclude-database")]
    exclude_databases: Vec<String>,

    /// Collection to exclude; `/regex/` for a pattern (repeatable)
    #[arg(long = "exclude-collection")]
    exclude_collections: Vec<String>,

    /// Exclude system collections
    #[arg(long)]
    exclude_system: bool,

    /// Exclude databases without collections (schema only)
    #[arg(long)]
    exclude_empty: bool,

    /// Return empty listings instead of failing on listing errors
    #[arg(long)]
    ignore_lack_of_permissions: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One name per line
    Text,
    /// Pretty-printed JSON
    Json,
}

impl ScanArgs {
    /// Flags only override the config file when given.
    fn to_scan_options(&self) -> Result<ScanOptions, String> {
        let mut options = ScanOptions::new().on_lack_of_permissions(|database, error| {
            match database {
                Some(database) => eprintln!("warning: {database}: {error}"),
                None => eprintln!("warning: {error}"),
            }
        });

        if !self.exclude_databases.is_empty() {
            let exclude = parse_exclusions(&self.exclude_databases).map_err(|e| e.to_string())?;
            options = options.exclude_databases(exclude);
        }
        if !self.exclude_collections.is_empty() {
            let exclude = parse_exclusions(&self.exclude_collections).map_err(|e| e.to_string())?;
            options = options.exclude_collections(exclude);
        }
        if self.exclude_system {
            options = options.exclude_system(true);
        }
        if self.exclude_empty {
            options = options.exclude_empty_databases(true);
        }
        if self.ignore_lack_of_permissions {
            options = options.ignore_lack_of_permissions(true);
        }

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let scanner = match build_scanner(&cli) {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Commands::Databases { scan } => cmd_databases(&scanner, scan, &cli.format).await,
        Commands::Collections { database, scan } => {
            cmd_collections(&scanner, database, scan, &cli.format).await
        }
        Commands::Schema { scan } => cmd_schema(&scanner, scan, &cli.format).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_scanner(cli: &Cli) -> Result<Scanner<MongoDriver>, String> {
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .map_err(|e| e.to_string())?;

    let mut params = settings
        .connection_params(cli.connection.as_deref())
        .map_err(|e| e.to_string())?;
    if let Some(uri) = &cli.uri {
        params.uri = uri.clone();
    }

    let defaults = settings.scan.to_scan_options().map_err(|e| e.to_string())?;

    Ok(Scanner::builder(MongoDriver::new())
        .uri(params.uri)
        .connection_options(params.options)
        .default_options(defaults)
        .build())
}

async fn cmd_databases(
    scanner: &Scanner<MongoDriver>,
    scan: &ScanArgs,
    format: &OutputFormat,
) -> Result<(), String> {
    let databases = scanner
        .list_databases(scan.to_scan_options()?)
        .await
        .map_err(|e| e.to_string())?;
    print_names(&databases, format)
}

async fn cmd_collections(
    scanner: &Scanner<MongoDriver>,
    database: &str,
    scan: &ScanArgs,
    format: &OutputFormat,
) -> Result<(), String> {
    let collections = scanner
        .list_collections(database, scan.to_scan_options()?)
        .await
        .map_err(|e| e.to_string())?;
    print_names(&collections, format)
}

async fn cmd_schema(
    scanner: &Scanner<MongoDriver>,
    scan: &ScanArgs,
    format: &OutputFormat,
) -> Result<(), String> {
    let schema = scanner
        .get_schema(scan.to_scan_options()?)
        .await
        .map_err(|e| e.to_string())?;

    match format {
        OutputFormat::Json => print_json(&schema),
        OutputFormat::Text => {
            print!("{}", render_schema(&schema));
            Ok(())
        }
    }
}

fn print_names(names: &[String], format: &OutputFormat) -> Result<(), String> {
    match format {
        OutputFormat::Json => print_json(&names),
        OutputFormat::Text => {
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn render_schema(schema: &DatabaseSchema) -> String {
    let mut out = String::new();
    for (database, collections) in schema {
        out.push_str(database);
        out.push('\n');
        for collection in collections {
            out.push_str("  ");
            out.push_str(collection);
            out.push('\n');
        }
    }
    out
}
