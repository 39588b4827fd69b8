//! Quarry CLI - compile and run collection queries
//!
//! Usage:
//!   quarry validate <model.json>
//!   quarry list <model.json>
//!   quarry compile <model.json> <request.json> [--output verbose]
//!   quarry query <request.json> [--model <model.json>] [--database <db.sqlite>]
//!   quarry identity <collection> <pk> [--model <model.json>] [--database <db.sqlite>]
//!
//! `query` and `identity` fall back to the `[model]` and `[database]`
//! sections of quarry.toml when the flags are omitted.

use clap::{Parser, Subcommand, ValueEnum};
use quarry::compile::{compile, QueryConditions};
use quarry::config::{Settings, SettingsError};
use quarry::exec::{fetch, SqlitePool};
use quarry::model::{load_model, FieldSetFieldDef, Model};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry - compile collection models and requests to SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a model and report problems
    Validate {
        /// Path to the model JSON
        file: PathBuf,
    },

    /// List collections, field-sets and custom queries in a model
    List {
        /// Path to the model JSON
        file: PathBuf,
    },

    /// Compile a request to SQL without running it
    Compile {
        /// Path to the model JSON
        file: PathBuf,

        /// Path to the request JSON
        request: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,
    },

    /// Run a request against the configured database and print rows as JSON
    Query {
        /// Path to the request JSON
        request: PathBuf,

        #[command(flatten)]
        sources: Sources,
    },

    /// Print the identity label of one record
    Identity {
        collection: String,
        pk: u64,

        #[command(flatten)]
        sources: Sources,
    },
}

#[derive(clap::Args)]
struct Sources {
    /// Model JSON (defaults to [model] path)
    #[arg(long)]
    model: Option<PathBuf>,

    /// SQLite database (defaults to [database] path)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Output SQL only
    Sql,
    /// Output SQL with the result column mapping
    Verbose,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings);

    match cli.command {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::List { file } => cmd_list(&file),
        Commands::Compile {
            file,
            request,
            output,
        } => cmd_compile(&file, &request, output),
        Commands::Query { request, sources } => cmd_query(&settings, &request, &sources),
        Commands::Identity {
            collection,
            pk,
            sources,
        } => cmd_identity(&settings, &collection, pk, &sources),
    }
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn read_model(file: &Path) -> Result<Model, ExitCode> {
    load_model(file).map_err(|e| {
        eprintln!("Error loading model '{}': {}", file.display(), e);
        ExitCode::FAILURE
    })
}

fn read_request(file: &Path) -> Result<QueryConditions, ExitCode> {
    let source = fs::read_to_string(file).map_err(|e| {
        eprintln!("Error reading file '{}': {}", file.display(), e);
        ExitCode::FAILURE
    })?;
    serde_json::from_str(&source).map_err(|e| {
        eprintln!("Invalid request '{}': {}", file.display(), e);
        ExitCode::FAILURE
    })
}

fn configured(
    path: Result<Option<PathBuf>, SettingsError>,
    what: &str,
) -> Result<PathBuf, ExitCode> {
    match path {
        Ok(Some(p)) => Ok(p),
        Ok(None) => {
            eprintln!("No {} given and none configured", what);
            Err(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

/// Resolve the model and database from flags, then settings.
fn open_sources(settings: &Settings, sources: &Sources) -> Result<(Model, SqlitePool), ExitCode> {
    let model_path = match &sources.model {
        Some(p) => p.clone(),
        None => configured(settings.model_path(), "model")?,
    };
    let db_path = match &sources.database {
        Some(p) => p.clone(),
        None => configured(settings.database_path(), "database")?,
    };

    let model = read_model(&model_path)?;
    let pool = SqlitePool::open(&db_path, settings.database.pool_size).map_err(|e| {
        eprintln!("Error opening database '{}': {}", db_path.display(), e);
        ExitCode::FAILURE
    })?;
    Ok((model, pool))
}

fn cmd_validate(file: &Path) -> ExitCode {
    let model = match read_model(file) {
        Ok(m) => m,
        Err(code) => return code,
    };

    for warning in &model.warnings {
        println!("warning: {}", warning);
    }
    println!(
        "Model is valid ({} collections, {} custom queries)",
        model.collections.len(),
        model.custom_queries.len()
    );
    ExitCode::SUCCESS
}

fn cmd_list(file: &Path) -> ExitCode {
    let model = match read_model(file) {
        Ok(m) => m,
        Err(code) => return code,
    };

    println!("File: {}", file.display());
    println!();

    println!("Collections:");
    for (name, collection) in &model.collections {
        println!("  {} ({} fields)", name, collection.fields.len());
        for (set_name, members) in &collection.field_sets {
            let paths: Vec<_> = members
                .iter()
                .map(|m| match m {
                    FieldSetFieldDef::Normal(_) => m.path().to_string(),
                    FieldSetFieldDef::Custom(_) => format!("{}*", m.path()),
                })
                .collect();
            println!("    - {}: {}", set_name, paths.join(", "));
        }
        for hook in &collection.hooks {
            println!(
                "    hook: {} {} -> {}",
                hook.when.field,
                hook.when.what,
                hook.action.kind()
            );
        }
    }

    if !model.custom_queries.is_empty() {
        println!();
        println!("Custom queries:");
        for (name, query) in &model.custom_queries {
            println!("  - {} ({} parameters)", name, query.parameters.len());
        }
    }

    ExitCode::SUCCESS
}

fn cmd_compile(file: &Path, request: &Path, output: OutputFormat) -> ExitCode {
    let model = match read_model(file) {
        Ok(m) => m,
        Err(code) => return code,
    };
    let request = match read_request(request) {
        Ok(r) => r,
        Err(code) => return code,
    };

    match compile(&model, &request) {
        Ok(compiled) => {
            match output {
                OutputFormat::Sql => println!("{}", compiled.sql),
                OutputFormat::Verbose => {
                    println!("-- Quarry Compiled SQL");
                    println!("-- Model: {}", file.display());
                    println!("-- Collection: {}", request.collection);
                    for column in &compiled.columns {
                        println!("-- {} -> {}", column.label, column.path);
                    }
                    println!();
                    println!("{}", compiled.sql);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_query(settings: &Settings, request: &Path, sources: &Sources) -> ExitCode {
    let request = match read_request(request) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let (model, pool) = match open_sources(settings, sources) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let rows = match fetch(&model, &pool, &request) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Query error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&rows) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error encoding rows: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_identity(settings: &Settings, collection: &str, pk: u64, sources: &Sources) -> ExitCode {
    let (model, pool) = match open_sources(settings, sources) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match model.identity_string(&pool, collection, pk) {
        Ok(label) => {
            println!("{}", label);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
