//! KCache CLI
//!
//! Runs a string-to-string cache over an in-process log, either as an
//! interactive shell on stdin or as a scripted walkthrough of the
//! put/get/delete contract.

mod shell;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use kcache::{KCache, NaturalOrder};
use kcache_codec::ScalarCodec;
use kcache_common::CacheConfig;
use kcache_log::MemoryLog;
use shell::{Command, StringCache};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kcache-cli")]
#[command(about = "KCache shell and demo")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML, `[cache]` table)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the topic name from the configuration
    #[arg(short, long)]
    topic: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read put/get/delete/scan/size commands from stdin
    Shell,
    /// Walk through a put, overwrite and delete of one key
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => CacheConfig::load(path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => CacheConfig::default(),
    };
    if let Some(topic) = args.topic {
        config.topic = topic;
    }

    info!("{}", startup_message(&config));

    let log = MemoryLog::new();
    let cache: StringCache = KCache::new(
        config,
        Arc::new(log),
        ScalarCodec::new(),
        ScalarCodec::new(),
        NaturalOrder,
    )?;
    cache.init().await.context("cache initialization failed")?;

    let outcome = match args.command {
        Commands::Shell => run_shell(&cache).await,
        Commands::Demo => run_demo(&cache).await,
    };

    cache.close().await;
    outcome
}

/// The CLI always runs on an in-process log; `bootstrap_servers` is unused
fn startup_message(config: &CacheConfig) -> String {
    format!(
        "Starting cache on topic {} over an in-process log",
        config.topic
    )
}

async fn run_shell(cache: &StringCache) -> Result<()> {
    println!("KCache shell on topic {} (type 'help')", cache.topic().name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match shell::parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        match shell::execute(cache, command).await {
            Ok(output) => println!("{output}"),
            Err(e) => println!("error: {e}"),
        }
    }
    Ok(())
}

async fn run_demo(cache: &StringCache) -> Result<()> {
    let key = "a".to_string();

    let previous = cache.put(&key, &"1".to_string()).await?;
    println!("put(a, 1)  -> previous {previous:?}");
    ensure!(previous.is_none(), "expected no previous value");

    let value = cache.get(&key);
    println!("get(a)     -> {value:?}");
    ensure!(value.as_deref() == Some("1"), "read-your-write violated");

    let previous = cache.put(&key, &"2".to_string()).await?;
    println!("put(a, 2)  -> previous {previous:?}");
    ensure!(previous.as_deref() == Some("1"), "expected previous value 1");

    let previous = cache.delete(&key).await?;
    println!("delete(a)  -> previous {previous:?}");
    ensure!(previous.as_deref() == Some("2"), "expected previous value 2");

    let value = cache.get(&key);
    println!("get(a)     -> {value:?}");
    ensure!(value.is_none(), "delete not visible");

    println!("size()     -> {}", cache.size());
    ensure!(cache.is_empty(), "cache should be empty");

    let stats = cache.stats();
    println!(
        "applied {} records, skipped {}, last offset {:?}",
        stats.applied,
        stats.skipped,
        cache.applied_offset(kcache::WRITE_PARTITION)
    );
    Ok(())
}
