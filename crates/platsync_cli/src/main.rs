//! platsync CLI
//!
//! Command-line tools for platsync.
//!
//! # Commands
//!
//! - `demo` - Run an owner and followers in-process and propagate platforms
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// platsync command-line tools.
#[derive(Parser)]
#[command(name = "platsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Propagate platforms from an owner to followers in one process
    Demo {
        /// Broker host name
        #[arg(long, env = "RABBITMQ_HOST", default_value = "localhost")]
        rabbitmq_host: String,

        /// Broker port
        #[arg(long, env = "RABBITMQ_PORT", default_value_t = platsync_bus::DEFAULT_BROKER_PORT)]
        rabbitmq_port: u16,

        /// Owner address used for the bulk fetch
        #[arg(long, env = "GRPC_PLATFORM", default_value = platsync_engine::DEFAULT_PEER_ADDRESS)]
        grpc_platform: String,

        /// Number of followers
        #[arg(short, long, default_value = "2")]
        followers: usize,

        /// Name of a platform to create (repeatable)
        #[arg(short, long = "create", default_value = "Docker")]
        create: Vec<String>,

        /// Make the broker unreachable before creating
        #[arg(long)]
        broker_down: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo {
            rabbitmq_host,
            rabbitmq_port,
            grpc_platform,
            followers,
            create,
            broker_down,
            format,
        } => {
            let options = commands::demo::DemoOptions {
                broker_host: rabbitmq_host,
                broker_port: rabbitmq_port,
                peer_address: grpc_platform,
                followers,
                create,
                broker_down,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(commands::demo::run(options, &format))?;
        }
        Commands::Version => {
            println!("platsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
