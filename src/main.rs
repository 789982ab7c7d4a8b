//! endpoint-extractor CLI entry point.

use clap::Parser;
use endpoint_extractor::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Commands::Extract(args) if args.verbose);
    cli::init_tracing(verbose);

    let result = match &cli.command {
        Commands::Extract(args) => cli::run_extract(args),
        Commands::Detect(args) => cli::run_detect(args),
        Commands::Init(args) => cli::run_init(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
