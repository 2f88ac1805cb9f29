//! system-settings CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use system_settings::config::Config;
use system_settings::db::Db;
use system_settings::error::SettingsError;
use system_settings::settings::{SettingsRecord, SettingsStore, TranscriptionRetryPolicy};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "system-settings")]
#[command(about = "Inspect and edit the system-wide key/value settings store")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the known settings that are missing, with their defaults
    Init,
    /// List every setting
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one setting
    Get {
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// Create a new setting
    Create {
        key: String,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Replace the value and description of an existing setting
    Update {
        key: String,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show the transcription retry policy resolved from the store
    RetryPolicy {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::load().with_context(|| "failed to load configuration")?
    };

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    tracing::debug!(data_dir = %config.data_dir.display(), "configuration loaded");

    let db = Db::connect(&config.sqlite_path(), &config.database)
        .await
        .with_context(|| "failed to connect to database")?;
    let store = SettingsStore::new(db.sqlite.clone());

    let result = run(&store, cli.command).await;

    db.close().await;
    result
}

async fn run(store: &SettingsStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            let inserted = store.ensure_defaults().await?;
            println!("{inserted} setting(s) created");
        }
        Command::List { json } => {
            let records = store.list_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print_record(record);
                }
            }
        }
        Command::Get { key, json } => {
            let Some(record) = store.get_by_key(&key).await? else {
                return Err(SettingsError::NotFound { key }.into());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
        }
        Command::Create {
            key,
            value,
            description,
        } => {
            let record = store
                .create(&key, value.as_deref(), description.as_deref())
                .await?;
            print_record(&record);
        }
        Command::Update {
            key,
            value,
            description,
        } => {
            let record = store
                .update(&key, value.as_deref(), description.as_deref())
                .await?;
            print_record(&record);
        }
        Command::RetryPolicy { json } => {
            let policy = TranscriptionRetryPolicy::load(store).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&policy)?);
                return Ok(());
            }
            match policy.retry_limit() {
                Some(limit) => println!("transcription retries limited to {limit}"),
                None => println!("transcription retries unlimited"),
            }
        }
    }

    Ok(())
}

fn print_record(record: &SettingsRecord) {
    println!(
        "{}\t{}\t{}",
        record.key,
        record.value.as_deref().unwrap_or("-"),
        record.updated_at.to_rfc3339()
    );
    if let Some(description) = &record.description {
        println!("\t{description}");
    }
}
