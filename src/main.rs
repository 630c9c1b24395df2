use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;

use lsm_control::admission::evaluate_admission;
use lsm_control::options::{ColumnFamilyOptions, ImmutableCfOptions, OptionsSnapshot, parse_options_str};

/// Inspect the limits and write admission a column family configuration leads to.
#[derive(Debug, Parser)]
#[command(name = "lsm-control", version)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the options and the per-level limits derived from them
    Derive {
        /// Option changes applied on top of the defaults, e.g. "write_buffer_size=32M; target_file_size_base=8M"
        #[arg(short, long, default_value = "")]
        options: String,

        #[arg(long, default_value_t = 7)]
        num_levels: usize,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a write given the level 0 file count and pending compaction bytes
    Admission {
        #[arg(short, long, default_value = "")]
        options: String,

        #[arg(long)]
        l0: usize,

        #[arg(long, default_value_t = 0)]
        pending: u64,
    },
}

fn options_from(changes: &str) -> anyhow::Result<ColumnFamilyOptions> {
    let mut options = ColumnFamilyOptions::default();
    let changes = parse_options_str(changes).context("parsing --options")?;
    options.apply_changes(changes)?;
    Ok(options)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    match args.command {
        Command::Derive {
            options,
            num_levels,
            json,
        } => {
            let immutable = ImmutableCfOptions::builder().num_levels(num_levels).build();
            let snapshot = OptionsSnapshot::build(options_from(&options)?, immutable, 1)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                for line in snapshot.dump_lines() {
                    println!("{line}");
                }
            }
        }
        Command::Admission {
            options,
            l0,
            pending,
        } => {
            let options = options_from(&options)?.sanitize();
            options.validate()?;
            let decision = evaluate_admission(&options, l0, pending);
            match decision.cause {
                Some(cause) => println!("{:?} ({cause:?})", decision.admission),
                None => println!("{:?}", decision.admission),
            }
        }
    }
    Ok(())
}
