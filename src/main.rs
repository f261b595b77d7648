//! filesrc - tail a local log source and print what it produces.

use anyhow::{Context, Result};
use clap::Parser;
use filesrc::persist::PersistStore;
use filesrc::{FileSourceDriver, GlobalConfig, LogMessage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "filesrc", version = filesrc::VERSION)]
#[command(about = "Read messages from a file, device or named pipe")]
struct Cli {
    /// Path of the source to read
    path: PathBuf,

    /// Treat the path as a named pipe, creating it when missing
    #[arg(long)]
    pipe: bool,

    /// Configuration file (defaults to the user config directory when present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Stop at end of input instead of waiting for more
    #[arg(long)]
    exit_on_eof: bool,

    /// Create missing parent directories
    #[arg(long)]
    create_dirs: bool,
}

fn load_config(cli: &Cli) -> Result<GlobalConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => GlobalConfig::default_path().filter(|p| p.is_file()),
    };
    let mut cfg = match path {
        Some(path) => GlobalConfig::load(&path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => GlobalConfig::default(),
    };

    let store = match &cfg.persist_file {
        Some(file) => PersistStore::open(file)
            .with_context(|| format!("opening persist file {}", file.display()))?,
        None => PersistStore::in_memory(),
    };
    cfg.attach_persist(Arc::new(store));
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let mut driver = if cli.pipe {
        FileSourceDriver::pipe(&cli.path, &cfg)
    } else {
        FileSourceDriver::file(&cli.path, &cfg)
    };
    driver.set_exit_on_eof(cli.exit_on_eof);
    driver.set_create_dirs(cli.create_dirs);
    driver
        .init(&cfg)
        .with_context(|| format!("initializing source {}", cli.path.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::Relaxed);
        }
    });

    let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<LogMessage>();
    let printer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let tag = msg.transport.map_or("-", |t| t.as_str());
            println!("{} {}: {}", tag, msg.file_name, msg.payload);
        }
    });

    let result = driver.run(&mut tx, shutdown).await;
    driver.deinit()?;
    drop(tx);
    printer.await?;
    result?;
    Ok(())
}
