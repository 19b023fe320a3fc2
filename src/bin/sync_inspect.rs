//! Sync Inspector CLI
//!
//! Read-only view into a sync database: table counts, time coverage,
//! per-stream watermarks, and the cached asset-pair reference data.
//!
//! Usage:
//!   cargo run --release --bin sync-inspect -- --db ./data/kraken_sync.db check
//!   cargo run --release --bin sync-inspect -- --db ./data/kraken_sync.db watermarks

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OpenFlags};

#[derive(Parser, Debug)]
#[command(name = "sync-inspect")]
#[command(about = "Inspect a Kraken sync database")]
struct Args {
    /// Path to SQLite database
    #[arg(long, default_value = "./data/kraken_sync.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Row counts and time coverage for each record table
    Check,

    /// Per-stream checkpoint watermarks
    Watermarks,

    /// Cached asset-pair reference entries
    Pairs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sync_inspect=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let conn = Connection::open_with_flags(&args.db, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database: {}", args.db))?;

    match args.command {
        Commands::Check => check(&conn, &args.db)?,
        Commands::Watermarks => watermarks(&conn)?,
        Commands::Pairs => pairs(&conn)?,
    }

    Ok(())
}

fn check(conn: &Connection, db_path: &str) -> Result<()> {
    println!("╔════════════════════════════════════════════════════════╗");
    println!("║              KRAKEN SYNC DATABASE CHECK                ║");
    println!("╚════════════════════════════════════════════════════════╝");
    println!();
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    println!("Database: {} (journal_mode={})", db_path, journal_mode);
    println!();

    let tables = [("trades", "Trades"), ("rewards", "Staking rewards")];

    for (table, name) in tables {
        if !table_exists(conn, table)? {
            println!("  {} : table not found", name);
            continue;
        }

        let query = format!("SELECT COUNT(*), MIN(time), MAX(time) FROM {}", table);
        let (count, first, last): (i64, Option<f64>, Option<f64>) = conn
            .query_row(&query, [], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .with_context(|| format!("Failed to read {}", table))?;

        println!("  {} :", name);
        println!("    Row count:     {}", count);
        if let (Some(first), Some(last)) = (first, last) {
            println!("    Oldest record: {}", fmt_ts(first));
            println!("    Newest record: {}", fmt_ts(last));
        }
        println!();
    }

    if table_exists(conn, "asset_pairs")? {
        let pairs: i64 = conn.query_row("SELECT COUNT(*) FROM asset_pairs", [], |row| row.get(0))?;
        println!("  Asset pairs cached: {}", pairs);
    }

    Ok(())
}

fn watermarks(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "checkpoints")? {
        println!("No checkpoints table; database has not seen a sync run yet.");
        return Ok(());
    }

    let mut stmt = conn.prepare(
        "SELECT stream_kind, watermark, updated_at FROM checkpoints ORDER BY stream_kind",
    )?;
    let rows: Vec<(String, f64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .filter_map(|r| r.ok())
        .collect();

    if rows.is_empty() {
        println!("No checkpoints recorded yet.");
        return Ok(());
    }

    println!("Checkpoints:");
    for (kind, watermark, updated_at) in rows {
        println!(
            "  {:<10} watermark {} ({})  updated {}",
            kind,
            watermark,
            fmt_ts(watermark),
            fmt_ts(updated_at as f64)
        );
    }

    Ok(())
}

fn pairs(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "asset_pairs")? {
        println!("No asset_pairs table; database has not seen a sync run yet.");
        return Ok(());
    }

    let mut stmt = conn
        .prepare("SELECT pair_code, wsname, base, quote FROM asset_pairs ORDER BY pair_code")?;
    let rows: Vec<(String, Option<String>, String, Option<String>)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .filter_map(|r| r.ok())
        .collect();

    println!("Cached asset pairs: {}", rows.len());
    for (code, wsname, base, quote) in rows {
        println!(
            "  {:<14} {:<12} base={} quote={}",
            code,
            wsname.unwrap_or_else(|| "-".to_string()),
            base,
            quote.unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn fmt_ts(unix_secs: f64) -> String {
    match Utc.timestamp_opt(unix_secs as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{}", unix_secs),
    }
}
