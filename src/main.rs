use anyhow::Result;
use clap::Parser;
use narrowscope::cli::{Cli, Commands};
use narrowscope::commands::{self, AnalyzeConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    match cli.command {
        Commands::Analyze {
            listings,
            format,
            output,
            config,
        } => commands::handle_analyze(AnalyzeConfig {
            listings,
            format,
            output,
            config,
        }),
        Commands::Init { force } => commands::init_config(force),
    }
}

// RUST_LOG wins over -v
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
