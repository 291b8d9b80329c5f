//! sispull - Pull SIS query data into tab-delimited flat files
//!
//! Exchanges client credentials for a bearer token, resolves the
//! active school year, counts records per configured entity, fetches
//! pages (or streams large entities), and promotes the resulting
//! flat files into the district's drop folder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, bail};
use clap::Parser;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde_json::Value;

use sispull_core::{ProgressContext, Transport, fmt_num};
use sispull_queries::{ClientConfig, PullOptions, StagePolicy, run_pull, select_entities, short_name};

#[derive(Parser)]
#[command(name = "sispull")]
#[command(about = "Pull SIS query data into tab-delimited flat files")]
#[command(version)]
struct Cli {
    /// District drop folder under /home; config is /home/{folder}/.{folder}.json
    #[arg(short, long)]
    folder: Option<String>,

    /// Pull only the attendance catalog
    #[arg(short, long)]
    attendance: bool,

    /// Pull a single entity by its short name
    #[arg(short, long)]
    single: Option<String>,

    /// Comma-separated short names to exclude from the standard pull
    #[arg(short, long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Log level: debug, info, warning, error, critical
    #[arg(short, long, default_value = "info")]
    log: String,

    /// Local config file, overriding the folder-derived path
    #[arg(short, long)]
    test: Option<PathBuf>,

    /// Output directory (default: the district drop folder)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.test {
        return Ok(path.clone());
    }
    match &cli.folder {
        Some(folder) => Ok(PathBuf::from(format!("/home/{folder}/.{folder}.json"))),
        None => bail!("either --folder or --test must be given"),
    }
}

fn output_dir(cli: &Cli) -> PathBuf {
    if let Some(dir) = &cli.output_dir {
        return dir.clone();
    }
    match &cli.folder {
        Some(folder) => PathBuf::from(format!("/home/{folder}")),
        None => PathBuf::from("."),
    }
}

/// Base URL for the tenant; bare hostnames get an https scheme.
fn base_url(hostname: &str) -> String {
    if hostname.starts_with("http") {
        hostname.to_string()
    } else {
        format!("https://{hostname}")
    }
}

/// Per-entity summary table. Entities that failed carry a raw string
/// in the result document instead of a counters map; both shapes are
/// rendered.
fn print_summary(result: &Value, entities: &[String]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Entity").fg(Color::Cyan),
            Cell::new("Records").fg(Color::Cyan),
            Cell::new("Pages").fg(Color::Cyan),
            Cell::new("File size").fg(Color::Cyan),
        ]);

    for entity in entities {
        let short = short_name(entity);
        match &result[short] {
            Value::Object(entry) => {
                let records = entry
                    .get("records")
                    .and_then(Value::as_u64)
                    .map(|n| fmt_num(n as usize))
                    .unwrap_or_default();
                let pages = entry
                    .get("pages")
                    .or_else(|| entry.get("stream"))
                    .and_then(Value::as_u64)
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                let size = entry
                    .get("file_sizes")
                    .and_then(|s| s.get("new"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                table.add_row(vec![short, records.as_str(), pages.as_str(), size]);
            }
            Value::String(error) => {
                let mut row = vec![Cell::new(short)];
                row.push(Cell::new(truncate(error, 60)).fg(Color::Red));
                table.add_row(row);
            }
            _ => {
                table.add_row(vec![short, "", "", ""]);
            }
        }
    }
    eprintln!("\n{table}");
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let started = Instant::now();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    sispull_core::init_logging(&cli.log, multi);

    let config = ClientConfig::from_file(&config_path(&cli)?)?;
    let options = PullOptions {
        attendance: cli.attendance,
        single: cli.single.clone(),
        exclude: cli.exclude.clone(),
    };
    let entities = select_entities(&config, &options);
    log::info!("pulling {} entities from {}", entities.len(), config.hostname);

    let mut transport = Transport::new(base_url(&config.hostname));
    let result = run_pull(
        &config,
        &options,
        &mut transport,
        &output_dir(&cli),
        progress,
        chrono::Local::now().date_naive(),
        StagePolicy::default(),
    )?;

    print_summary(&result, &entities);
    log::info!("total time {:.2?}", started.elapsed());
    Ok(())
}
