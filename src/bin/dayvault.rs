//! DayVault CLI
//!
//! Operator command-line interface for a DayVault data directory.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use dayvault::{CollectionConfig, InsertOutcome, Record, Vault, VaultConfig};

/// DayVault CLI
#[derive(Parser, Debug)]
#[command(name = "dayvault")]
#[command(about = "Embedded, time-sharded, encrypted record store")]
#[command(version)]
struct Args {
    /// Root data directory
    #[arg(short, long, default_value = "./dayvault_data")]
    root: String,

    /// Master secret for daily key derivation
    /// (falls back to the DAYVAULT_MASTER_KEY environment variable)
    #[arg(long)]
    master_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert a JSON record into today's shard
    Insert {
        /// Target collection
        collection: String,

        /// The record as a JSON object (must carry an "id" field)
        record: String,

        /// Fields that must be unique within a shard (repeatable)
        #[arg(long = "unique")]
        unique: Vec<String>,

        /// Fields with a secondary index (repeatable)
        #[arg(long = "indexed")]
        indexed: Vec<String>,

        /// Extra fields open to prefix search (repeatable)
        #[arg(long = "search-prefix")]
        search_prefix: Vec<String>,
    },

    /// Look up one record through a field's index
    Get {
        /// Target collection
        collection: String,

        /// Shard date, YYYY-MM-DD
        date: String,

        /// Indexed field to look up
        field: String,

        /// Exact field value
        value: String,
    },

    /// Prefix search over a field's index
    Search {
        /// Target collection
        collection: String,

        /// Shard date, YYYY-MM-DD
        date: String,

        /// Field to search
        field: String,

        /// Value prefix
        prefix: String,

        /// Max records returned
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Fields that must be unique within a shard (repeatable)
        #[arg(long = "unique")]
        unique: Vec<String>,

        /// Fields with a secondary index (repeatable)
        #[arg(long = "indexed")]
        indexed: Vec<String>,

        /// Extra fields open to prefix search (repeatable)
        #[arg(long = "search-prefix")]
        search_prefix: Vec<String>,
    },

    /// Dump every record in one day's shard
    Day {
        /// Target collection
        collection: String,

        /// Shard date, YYYY-MM-DD
        date: String,
    },

    /// Migrate one day's legacy db.json into the engine
    Migrate {
        /// Target collection
        collection: String,

        /// Legacy day, YYYY-MM-DD
        date: String,

        /// Fields that must be unique within a shard (repeatable)
        #[arg(long = "unique")]
        unique: Vec<String>,

        /// Fields with a secondary index (repeatable)
        #[arg(long = "indexed")]
        indexed: Vec<String>,

        /// Extra fields open to prefix search (repeatable)
        #[arg(long = "search-prefix")]
        search_prefix: Vec<String>,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dayvault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("command failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> dayvault::Result<()> {
    let master_key = args
        .master_key
        .or_else(|| std::env::var("DAYVAULT_MASTER_KEY").ok());

    let mut builder = VaultConfig::builder().root_dir(&args.root);
    if let Some(key) = master_key {
        builder = builder.master_key(key);
    }
    let vault = Vault::open(builder.build())?;

    let result = execute(&vault, args.command);
    vault.close();
    result
}

fn execute(vault: &Vault, command: Commands) -> dayvault::Result<()> {
    match command {
        Commands::Insert {
            collection,
            record,
            unique,
            indexed,
            search_prefix,
        } => {
            vault.define_collection(
                &collection,
                CollectionConfig {
                    unique,
                    indexed,
                    search_prefix,
                    ..CollectionConfig::default()
                },
            );

            let record = Record::from_value(serde_json::from_str(&record)?)?;
            match vault.insert(&collection, record)? {
                InsertOutcome::Inserted { id } => println!("inserted {id}"),
                outcome @ InsertOutcome::Duplicate { .. } => {
                    println!("{outcome}");
                    if let InsertOutcome::Duplicate { existing, .. } = outcome {
                        println!("{}", serde_json::to_string_pretty(&existing)?);
                    }
                }
            }
        }

        Commands::Get {
            collection,
            date,
            field,
            value,
        } => {
            let (year, month, day) = parse_date(&date)?;
            match vault.get_by_field(&collection, year, month, day, &field, &value)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("not found"),
            }
        }

        Commands::Search {
            collection,
            date,
            field,
            prefix,
            limit,
            unique,
            indexed,
            search_prefix,
        } => {
            vault.define_collection(
                &collection,
                CollectionConfig {
                    unique,
                    indexed,
                    search_prefix,
                    ..CollectionConfig::default()
                },
            );

            let (year, month, day) = parse_date(&date)?;
            let records = vault.search(&collection, year, month, day, &field, &prefix, limit)?;
            println!("{} record(s)", records.len());
            for record in records {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }

        Commands::Day { collection, date } => {
            let (year, month, day) = parse_date(&date)?;
            let records = vault.get_day(&collection, year, month, day)?;
            println!("{} record(s)", records.len());
            for record in records {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }

        Commands::Migrate {
            collection,
            date,
            unique,
            indexed,
            search_prefix,
        } => {
            vault.define_collection(
                &collection,
                CollectionConfig {
                    unique,
                    indexed,
                    search_prefix,
                    ..CollectionConfig::default()
                },
            );

            let (year, month, day) = parse_date(&date)?;
            let report = vault.migrate_old_day(&collection, year, month, day)?;
            println!(
                "migrated: {} inserted, {} duplicates, {} failed, {} chunks skipped",
                report.records_inserted,
                report.duplicates_skipped,
                report.records_failed,
                report.chunks_skipped
            );
        }
    }

    Ok(())
}

/// Parse a YYYY-MM-DD argument into shard coordinates
fn parse_date(date: &str) -> dayvault::Result<(i32, u32, u32)> {
    use chrono::Datelike;

    let parsed = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| dayvault::VaultError::Validation(format!("bad date {date}: {e}")))?;
    Ok((parsed.year(), parsed.month(), parsed.day()))
}
