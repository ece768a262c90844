// CLI binary entry point for oggfeed
//
// This is the main entry point for the oggfeed command-line tool.

mod cli;

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::commands;
use cli::{Commands, Config, OutputFormatter};

fn main() {
    let config = Config::parse();
    init_logging(config.verbose);

    let formatter = OutputFormatter::new(config.format, config.quiet);
    let result = match &config.command {
        Commands::Decode { file, output } => commands::command_decode(file, output, &config, &formatter),
        Commands::Detect { files } => commands::command_detect(files, &config, &formatter),
        Commands::Info { files } => commands::command_info(files, &config, &formatter),
        Commands::Batch { directory, pattern } => {
            commands::command_batch(directory, pattern, &config, &formatter)
        }
    };

    if let Err(e) = result {
        formatter.print_error(&format!("{:#}", e));
        process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` wins unless `--verbose` is given
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
