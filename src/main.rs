use clap::Parser;
use fleet_preprocessor::cli::{self, Args};
use std::process;

fn main() {
    let args = Args::parse();
    cli::setup_logging(args.command.log_level());

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let exit_code = runtime.block_on(async {
        tokio::select! {
            result = cli::run(args) => match result {
                Ok(()) => 0,
                Err(error) => {
                    eprintln!("Error: {:#}", error);
                    1
                }
            },
            _ = tokio::signal::ctrl_c() => {
                // Committed chunks are checkpointed; the next run resumes from them
                eprintln!("\nReceived CTRL+C, stopping. Re-run the same command to resume.");
                130
            }
        }
    });

    process::exit(exit_code);
}
