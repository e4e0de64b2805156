// src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendance_core::aggregate::{aggregate_by_employee, rank, DEFAULT_RANKING_SIZE};
use attendance_core::export::{attendance_table, to_csv};
use attendance_core::server::{serve, AppState};
use attendance_core::session_store::SessionStore;
use attendance_core::{Config, ExclusionSets, NormalizeOptions, SheetClient, SheetService};

#[derive(Parser)]
#[command(name = "attendance-server")]
#[command(about = "Attendance dashboard API and reports over spreadsheet schedules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print worst/best attendance for one sheet
    Report {
        #[arg(long)]
        warehouse: String,
        #[arg(long)]
        sheet: String,
        /// Only rows for this employee
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = DEFAULT_RANKING_SIZE)]
        top: usize,
        /// Also write the per-row attendance table here
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// List the sheets of a warehouse
    Sheets {
        #[arg(long)]
        warehouse: String,
    },
}

fn build_service(config: &Config) -> Result<SheetService> {
    let client = SheetClient::new(config.sheet_api_url.clone(), config.request_timeout())
        .context("failed to build the sheet API client")?;
    Ok(SheetService::new(Arc::new(client)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to read configuration from environment")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let service = build_service(&config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server_host = host;
            }
            if let Some(port) = port {
                config.server_port = port;
            }
            info!(
                "Starting attendance server, sessions stored in {}",
                config.session_dir.display()
            );
            let sessions = SessionStore::new(config.session_dir.clone());
            let address = config.bind_address();
            let state = AppState::new(service, sessions, &config);
            serve(state, &address)
                .await
                .with_context(|| format!("server on {} stopped with an error", address))?;
        }
        Commands::Report {
            warehouse,
            sheet,
            name,
            top,
            csv,
        } => {
            let options = NormalizeOptions::for_sheet(sheet.as_str());
            if !options.attendance_enabled() {
                bail!("'{}' is not a schedule sheet; attendance is only computed for schedules", sheet);
            }
            let loaded = service
                .load_sheet(&warehouse, &sheet, name.as_deref().unwrap_or(""), &options)
                .await
                .with_context(|| format!("failed to load sheet '{}'", sheet))?;
            let employees =
                aggregate_by_employee(&loaded.rows, &loaded.date_columns, &ExclusionSets::default());
            if employees.is_empty() {
                println!("No employees found in '{}'.", sheet);
                return Ok(());
            }

            let ranking = rank(&employees, top);
            println!("Lowest attendance in {} / {}:", warehouse, sheet);
            for entry in &ranking.worst {
                println!(
                    "- {} {} {}",
                    entry.name,
                    entry.summary.display(),
                    entry.summary.status.label()
                );
            }
            println!("Highest attendance:");
            for entry in &ranking.best {
                println!(
                    "- {} {} {}",
                    entry.name,
                    entry.summary.display(),
                    entry.summary.status.label()
                );
            }

            if let Some(path) = csv {
                let (headers, rows) = attendance_table(&loaded);
                std::fs::write(&path, to_csv(&headers, &rows))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Wrote {} rows to {}.", rows.len(), path.display());
            }
        }
        Commands::Sheets { warehouse } => {
            let sheets = service
                .list_sheets(&warehouse)
                .await
                .with_context(|| format!("failed to list sheets for '{}'", warehouse))?;
            for name in sheets {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
