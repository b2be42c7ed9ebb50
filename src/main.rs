//! liteview command-line host.
//!
//! # Usage
//!
//! ```bash
//! # Browse the demo dataset
//! liteview --table Orders --limit 5
//!
//! # Run a script against a database file
//! liteview --file chinook.db --sql "SELECT COUNT(*) FROM tracks"
//!
//! # Export a table as CSV and save a copy of the database
//! liteview --file chinook.db --table albums --export-csv --download copy.db
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use liteview::services::session::messages::{
    ExecRequest, ExportRequest, ExportType, PageRequest,
};
use liteview::{Request, Response, SessionConfig, SessionHandle, SessionWorker};

/// Browse and query a SQLite database
#[derive(Parser, Debug)]
#[command(name = "liteview", version, about = "Browse and query a SQLite database")]
struct Args {
    /// Database file to open; the demo dataset is used when omitted
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// SQL script to execute
    #[arg(short = 's', long)]
    sql: Option<String>,

    /// Table to read; defaults to the first table in the catalog
    #[arg(short = 't', long)]
    table: Option<String>,

    /// Page size
    #[arg(short = 'l', long, default_value_t = 50)]
    limit: i64,

    /// Page offset
    #[arg(short = 'o', long, default_value_t = 0)]
    offset: i64,

    /// Print the table (or the --sql result) as CSV instead of JSON
    #[arg(long)]
    export_csv: bool,

    /// Write the database image to this path before exiting
    #[arg(long, value_name = "FILE")]
    download: Option<PathBuf>,

    /// Session configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_logging();

    match smol::block_on(run(Args::parse())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::from_file(path).await?,
        None => SessionConfig::default(),
    };

    let (handle, worker) = SessionWorker::spawn(config).context("Failed to start session worker")?;

    let opened = match &args.file {
        Some(path) => {
            let file = async_fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            send(&handle, Request::OpenFile { file }).await?
        }
        None => send(&handle, Request::Init).await?,
    };

    let first_table = match &opened {
        Response::InitComplete { current_table, .. } => current_table.clone(),
        _ => None,
    };
    let table = args.table.clone().or(first_table);

    if args.export_csv {
        let request = match (&args.sql, &table) {
            (Some(query), _) => ExportRequest {
                table: None,
                filters: Default::default(),
                sorters: Default::default(),
                limit: None,
                offset: None,
                export_type: ExportType::Custom,
                custom_query: Some(query.clone()),
            },
            (None, Some(table)) => ExportRequest {
                table: Some(table.clone()),
                filters: Default::default(),
                sorters: Default::default(),
                limit: args.table.is_some().then_some(args.limit),
                offset: args.table.is_some().then_some(args.offset),
                export_type: ExportType::Current,
                custom_query: None,
            },
            (None, None) => bail!("Nothing to export: the database has no tables"),
        };

        if let Response::ExportComplete { results } = send(&handle, Request::Export(request)).await? {
            println!("{results}");
        }
    } else {
        let page = PageRequest {
            current_table: table,
            limit: args.limit,
            offset: args.offset,
            ..Default::default()
        };
        let request = match &args.sql {
            Some(query) => Request::Exec(ExecRequest {
                query: query.clone(),
                page,
            }),
            None => Request::GetTableData(page),
        };

        let response = send(&handle, request).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    if let Some(path) = &args.download {
        if let Response::DownloadComplete { bytes } = send(&handle, Request::Download).await? {
            async_fs::write(path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), size = bytes.len(), "Saved database");
        }
    }

    drop(handle);
    if worker.join().is_err() {
        bail!("Session worker panicked");
    }
    Ok(())
}

/// Send a request, turning a `queryError` response into an error.
async fn send(handle: &SessionHandle, request: Request) -> Result<Response> {
    let response = handle.send(request).await?;
    if let Response::QueryError { error } = &response {
        bail!("{}", error.message);
    }
    Ok(response)
}
