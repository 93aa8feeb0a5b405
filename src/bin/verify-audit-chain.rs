use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, Command};
use tracing::info;

use audit_chain::{
    AuditConfig, ChainHasher, ChainVerifier, SqliteStore, VerificationReport, VerifyScope,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("verify-audit-chain")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify audit chain integrity for one partition or the whole log")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("Database URL (defaults to DATABASE_URL)"),
        )
        .arg(
            Arg::new("partition")
                .short('p')
                .long("partition")
                .value_name("KEY")
                .help("Limit the scan to one partition"),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("RFC3339")
                .help("Scan window start (inclusive)"),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("RFC3339")
                .help("Scan window end (exclusive)"),
        )
        .arg(
            Arg::new("batch-size")
                .short('b')
                .long("batch-size")
                .value_name("N")
                .help("Entries fetched per batch"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the full report as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Fail-fast: no integrity key, no verification.
    let mut config = AuditConfig::load()?;
    if let Some(url) = matches.get_one::<String>("database-url") {
        config.database_url = url.clone();
    }
    if let Some(batch) = matches.get_one::<String>("batch-size") {
        config.verify_batch_size = batch
            .parse()
            .map_err(|_| anyhow!("--batch-size is not a number: {}", batch))?;
    }

    let scope = VerifyScope {
        partition_key: matches.get_one::<String>("partition").cloned(),
        from: parse_time(matches.get_one::<String>("from"), "--from")?,
        to: parse_time(matches.get_one::<String>("to"), "--to")?,
    };

    info!("Verifying audit chain in {}", config.database_url);
    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let verifier = ChainVerifier::new(store, ChainHasher::new(config.integrity_key.clone()))
        .with_batch_size(config.verify_batch_size);

    let report = verifier.verify(&scope).await;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        print_report(&report, verbose);
    }

    if !report.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_time(value: Option<&String>, flag: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| anyhow!("{} is not an RFC 3339 timestamp ({}): {}", flag, v, e))
        })
        .transpose()
}

fn print_report(report: &VerificationReport, verbose: bool) {
    println!("{}", report.summary());

    if verbose {
        println!("\nScan details:");
        println!("  Total entries:    {}", report.total_entries);
        println!("  Verified entries: {}", report.verified_entries);
        println!("  Scan complete:    {}", report.complete);
        if let Some(first) = report.first_entry_time {
            println!("  First entry:      {}", first.to_rfc3339());
        }
        if let Some(last) = report.last_entry_time {
            println!("  Last entry:       {}", last.to_rfc3339());
        }
    }

    for chain_break in &report.broken_links {
        println!("  {}", chain_break.describe());
    }
}
