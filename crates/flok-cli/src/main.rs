//! flok - ordered, locked, tamper-checked migrations

use clap::Parser;

mod cli;
mod commands;
mod context;
mod logger;

use cli::{Cli, Commands};
use commands::common::ExitCode;
use commands::{clear, down, lock, show, up};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let logger = logger::init(cli.global.verbose);

    let result = match &cli.command {
        Commands::Up => up::execute(&cli.global, logger).await,
        Commands::Down => down::execute(&cli.global, logger).await,
        Commands::Show(args) => show::execute(args, &cli.global, logger).await,
        Commands::Lock(args) => lock::execute(args, &cli.global, logger).await,
        Commands::Clear(args) => clear::execute(args, &cli.global, logger).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => std::process::ExitCode::from(*code as u8),
            None => {
                eprintln!("Error: {err:#}");
                std::process::ExitCode::FAILURE
            }
        },
    }
}
