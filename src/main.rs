use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, DECIMAL};
use tracing_subscriber::EnvFilter;

use drift::config::Config;
use drift::ops;
use drift::store::{EnumerateOptions, RemoteStore, S3Store};

#[derive(Parser)]
#[command(name = "drift", version, about = "Reconcile local directories with remote storage")]
struct Cli {
    /// Alternate config file (default: ~/.config/drift/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List remote files
    List {
        /// Stop after this many items
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// List remote files whose name contains a string
    Search {
        query: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Upload a local file
    Upload {
        file: PathBuf,
        /// Target parent directory id
        #[arg(long)]
        parent: Option<String>,
    },
    /// List remote directories
    Directories,
    /// Delete a remote item by id
    Delete { id: String },
    /// Reconcile the local mirror with the remote
    Sync {
        /// Classify only; perform no transfers
        #[arg(long)]
        dry_run: bool,
        /// Print the classification report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let s3 = config
        .s3
        .clone()
        .context("no [s3] section in the config file")?;
    let mut store = S3Store::from_config(&s3)?;

    match cli.command {
        Command::List { limit } => {
            let mut options = EnumerateOptions::all();
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            list_files(&mut store, &config, &options)?;
        }
        Command::Search { query, limit } => {
            let mut options = EnumerateOptions::all().with_search(query);
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            list_files(&mut store, &config, &options)?;
        }
        Command::Upload { file, parent } => {
            let id = store.store(&file, parent.as_deref())?;
            println!("{} {} -> {}", "uploaded".green(), file.display(), id);
        }
        Command::Directories => {
            let mut names: Vec<String> = Vec::new();
            store.enumerate_directories(&mut |record| {
                names.push(format!(
                    "{}\t{}",
                    record.backend_id.as_deref().unwrap_or("-"),
                    record.canonical_path
                ));
            })?;
            names.sort();
            for name in names {
                println!("{}", name);
            }
        }
        Command::Delete { id } => {
            store.delete(&id)?;
            println!("{} {}", "deleted".red(), id);
        }
        Command::Sync { dry_run, json } => {
            let outcome = ops::sync(&config, &mut store, dry_run)?;
            if json {
                println!("{}", outcome.report.to_json()?);
            } else {
                print!("{}", outcome.report.to_plain_text());
            }
            if dry_run {
                println!("{}", "dry run, nothing transferred".yellow());
            } else {
                println!(
                    "{}: {} uploaded, {} downloaded ({}), {} skipped",
                    "sync complete".green(),
                    outcome.uploaded,
                    outcome.downloaded,
                    format_size(outcome.bytes_downloaded, DECIMAL),
                    outcome.skipped,
                );
            }
        }
    }

    Ok(())
}

fn list_files(
    store: &mut S3Store,
    config: &Config,
    options: &EnumerateOptions,
) -> Result<()> {
    let (index, cache) = ops::build_remote_index(store, options, &config.cache_dir())?;
    for record in index.sorted_records() {
        let mtime = chrono::DateTime::from_timestamp(record.stat.mtime, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10}  {}  {}",
            format_size(record.stat.size, DECIMAL),
            mtime,
            record.canonical_path
        );
    }
    cache.write(&index)?;
    Ok(())
}
