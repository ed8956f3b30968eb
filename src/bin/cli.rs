//! pmapkv CLI
//!
//! Command-line interface over a directory store of string keys and values.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pmapkv::{Config, PairFormat, Result, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// pmapkv CLI
#[derive(Parser, Debug)]
#[command(name = "pmapkv-cli")]
#[command(about = "CLI for the pmapkv persistent map")]
#[command(version)]
struct Args {
    /// Directory holding the store files
    #[arg(short, long, default_value = "./pmapkv_data")]
    dir: String,

    /// Store name (file prefix)
    #[arg(short, long, default_value = "store")]
    name: String,

    /// Reuse the space of removed pairs
    #[arg(short, long)]
    partitioned: bool,

    /// Memory-map the index file
    #[arg(short, long)]
    cache_index: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Insert or replace a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Remove a key
    Remove {
        /// The key to remove
        key: String,
    },

    /// Print every pair
    List,

    /// Print the pair count and file size
    Stats,

    /// Remove every pair
    Clear,
}

fn run(args: Args) -> Result<()> {
    std::fs::create_dir_all(&args.dir)?;

    let format = if args.partitioned {
        PairFormat::Partitioned
    } else {
        PairFormat::Append
    };
    let config = Config::builder()
        .directory(&args.dir, args.name.as_str())
        .pair_format(format)
        .cache_index(args.cache_index)
        .build();

    let store: Store<String, String> = Store::open(config)?;

    match args.command {
        Commands::Get { key } => match store.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => match store.put(key, value)? {
            Some(old) => println!("OK (replaced {:?})", old),
            None => println!("OK"),
        },
        Commands::Remove { key } => match store.remove(&key)? {
            Some(_) => println!("(removed)"),
            None => println!("(nil)"),
        },
        Commands::List => {
            for entry in store.iter() {
                let (key, value) = entry?;
                println!("{}\t{}", key, value);
            }
        }
        Commands::Stats => {
            println!("pairs:     {}", store.len()?);
            println!("format:    {:?}", store.pair_format());
            println!("file size: {} bytes", store.file_size()?);
        }
        Commands::Clear => {
            store.clear()?;
            println!("OK");
        }
    }

    store.close()
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pmapkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("pmapkv CLI v{}", pmapkv::VERSION);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
