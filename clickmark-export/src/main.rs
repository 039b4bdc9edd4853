//! clickmark-export - write the study database to an .xlsx workbook

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use clickmark_common::config::FileConfig;
use clickmark_export::{connect_readonly, export_database};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DATABASE: &str = "instance/app.db";
const DEFAULT_EXPORT_DIR: &str = "instance/export";

#[derive(Parser, Debug)]
#[command(name = "clickmark-export")]
#[command(about = "Export every study table to one spreadsheet")]
#[command(version)]
struct Args {
    /// File name of the workbook, created inside the export folder
    output_filename: String,

    /// TOML config file
    #[arg(long, env = "CLICKMARK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "CLICKMARK_DATABASE")]
    database: Option<PathBuf>,

    /// Folder receiving the workbook
    #[arg(long, env = "CLICKMARK_EXPORT_DIR")]
    export_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clickmark_export=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let file = FileConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let database = args
        .database
        .or(file.database)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
    let export_dir = args
        .export_dir
        .or(file.export_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR));

    std::fs::create_dir_all(&export_dir)
        .with_context(|| format!("Failed to create export folder {}", export_dir.display()))?;
    let out_path = export_dir.join(&args.output_filename);

    info!("Exporting {} to {}", database.display(), out_path.display());
    let pool = connect_readonly(&database).await?;
    let summaries = export_database(&pool, &out_path).await?;
    pool.close().await;

    for sheet in &summaries {
        println!("{}: {} rows", sheet.name, sheet.rows);
    }

    Ok(())
}
