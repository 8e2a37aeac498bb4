mod catalog;
mod db;
mod export;
mod github;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{info, warn};

use catalog::group::Profile;
use export::Format;
use github::GithubClient;
use settings::Settings;

#[derive(Parser)]
#[command(name = "snippet-catalog", about = "ServiceNow code-snippets catalog builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the repository tree and store it
    Init,
    /// Fetch file contents not yet stored (or last failed transiently)
    Fetch {
        /// Max files to fetch (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = Profile::All)]
        profile: Profile,
    },
    /// Build catalog records from stored files
    Process {
        #[arg(long, value_enum, default_value_t = Profile::All)]
        profile: Profile,
    },
    /// Init + fetch + process (+ export when --out is given)
    Run {
        /// Max files to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = Profile::All)]
        profile: Profile,
        /// Write the table here after processing
        #[arg(long)]
        out: Option<PathBuf>,
        /// Output format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<Format>,
    },
    /// Write the stored catalog to a file
    Export {
        #[arg(long)]
        out: PathBuf,
        /// Output format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<Format>,
    },
    /// Show fetch and catalog statistics
    Stats,
    /// Compact table of catalog records
    Overview {
        /// Filter by category (e.g. "Server-Side Components")
        #[arg(short, long)]
        category: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Init => {
            let listed = init(&conn, &settings).await?;
            println!("Stored {} tree entries", listed);
            Ok(())
        }
        Commands::Fetch { limit, profile } => {
            fetch(&conn, &settings, limit, profile).await?;
            Ok(())
        }
        Commands::Process { profile } => {
            let counts = process(&conn, profile)?;
            counts.print();
            Ok(())
        }
        Commands::Run {
            limit,
            profile,
            out,
            format,
        } => {
            let t_init = Instant::now();
            let listed = init(&conn, &settings).await?;
            println!(
                "Listed {} entries in {:.1}s",
                listed,
                t_init.elapsed().as_secs_f64()
            );

            let t_fetch = Instant::now();
            fetch(&conn, &settings, limit, profile).await?;
            println!("Fetched in {:.1}s", t_fetch.elapsed().as_secs_f64());

            let t_process = Instant::now();
            let counts = process(&conn, profile)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();

            if let Some(out) = out {
                export_to(&conn, &out, format)?;
            }
            Ok(())
        }
        Commands::Export { out, format } => export_to(&conn, &out, format),
        Commands::Overview { category, limit } => {
            let rows = db::fetch_overview(&conn, category.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No records found. Run 'process' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<28} | {:<20} | {:<24} | {:<16} | {:<10}",
                "#", "Name", "Type", "Subcategory", "Table", "Event"
            );
            println!("{}", "-".repeat(116));

            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<28} | {:<20} | {:<24} | {:<16} | {:<10}",
                    i + 1,
                    truncate(&r.name, 28),
                    truncate(&r.script_type, 20),
                    truncate(&r.subcategory, 24),
                    truncate(&r.table, 16),
                    r.client_side_type
                );
            }

            let mut categories: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
            categories.dedup();
            println!("\n{} records | {}", rows.len(), categories.join(", "));
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Entries:   {}", s.entries);
            println!("Blobs:     {}", s.blobs);
            println!("Fetched:   {}", s.fetched);
            println!("Transient: {}", s.transient);
            println!("Fatal:     {}", s.fatal);
            println!("Records:   {}", s.records);
            if let Some(run) = s.last_run {
                println!(
                    "Last run:  {} ({}, {}) {} units, {} records, {} skipped files",
                    run.run_id, run.profile, run.started_at, run.units, run.records, run.skipped_files
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn init(conn: &Connection, settings: &Settings) -> anyhow::Result<usize> {
    let client = GithubClient::new(settings)?;
    let sha = client.branch_sha().await?;
    info!("{}/{}@{} is at {}", settings.owner, settings.repo, settings.branch, sha);
    let nodes = client.list_tree(&sha).await?;
    db::save_entries(conn, &nodes)
}

async fn fetch(
    conn: &Connection,
    settings: &Settings,
    limit: Option<usize>,
    profile: Profile,
) -> anyhow::Result<()> {
    let entries = db::load_entries(conn)?;
    if entries.is_empty() {
        println!("No tree entries. Run 'init' first.");
        return Ok(());
    }
    let wanted = catalog::wanted_paths(&entries, profile);
    let paths = db::paths_to_fetch(conn, &wanted, limit)?;
    if paths.is_empty() {
        println!("Nothing to fetch ({} wanted files already stored).", wanted.len());
        return Ok(());
    }

    println!("Fetching {} of {} wanted files (streaming to DB)...", paths.len(), wanted.len());
    let client = Arc::new(GithubClient::new(settings)?);
    let stats = github::fetch_blobs_streaming(conn, client, paths, settings.concurrency).await?;
    println!(
        "Done: {} fetched ({} ok, {} transient, {} fatal).",
        stats.total, stats.ok, stats.transient, stats.fatal
    );
    if stats.transient > 0 {
        warn!("{} transient failures; run 'fetch' again to retry them", stats.transient);
    }
    Ok(())
}

struct ProcessCounts {
    profile: Profile,
    units: usize,
    records: usize,
    skipped_files: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} records from {} units ({} profile, {} files missing text).",
            self.records,
            self.units,
            self.profile.name(),
            self.skipped_files,
        );
    }
}

fn process(conn: &Connection, profile: Profile) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};

    let started_at = chrono::Utc::now();
    let entries = db::load_entries(conn)?;
    let texts = db::load_texts(conn)?;
    info!("Loaded {} entries and {} texts", entries.len(), texts.len());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} units ({per_sec})")?,
    );
    let built = catalog::build_catalog(&entries, &texts, profile, |n| pb.inc(n as u64));
    pb.finish_and_clear();

    db::save_records(conn, &built.records)?;
    db::insert_run(
        conn,
        &db::RunRow {
            run_id: db::new_run_id(started_at),
            profile: profile.name().to_string(),
            started_at: started_at.to_rfc3339(),
            units: built.units,
            records: built.records.len(),
            skipped_files: built.skipped_files,
        },
    )?;
    if built.skipped_files > 0 {
        warn!("{} wanted files have no fetched text", built.skipped_files);
    }

    Ok(ProcessCounts {
        profile,
        units: built.units,
        records: built.records.len(),
        skipped_files: built.skipped_files,
    })
}

fn export_to(conn: &Connection, out: &Path, format: Option<Format>) -> anyhow::Result<()> {
    let records = db::load_records(conn)?;
    if records.is_empty() {
        println!("No records to export. Run 'process' first.");
        return Ok(());
    }
    let format = format.unwrap_or_else(|| Format::from_path(out));
    export::write(&records, out, format)
        .with_context(|| format!("Export to {} failed", out.display()))?;
    println!("Wrote {} records to {} ({:?})", records.len(), out.display(), format);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
