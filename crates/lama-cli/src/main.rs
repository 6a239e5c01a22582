//! LogLama CLI binary entrypoint.
//!
//! This is the main entry point for the `loglama` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lama_cli::cli::{Cli, Commands};
use lama_cli::commands::{
    ClearCommand, CollectCommand, EmitCommand, ExportCommand, LogsCommand, StatsCommand,
    WatchCommand,
};
use lama_cli::output::OutputFormat;
use lama_cli::{open_store, query_service};

fn main() -> ExitCode {
    // Values from a `.env` file never override the real environment
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // Diagnostics go to stderr so stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), lama_cli::CliError> {
    let config = cli.load_config()?;
    let store = open_store(&config)?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Logs(args) => {
            let service = query_service(store, &config);
            LogsCommand::new(&service).execute(&mut stdout, &format, &args)?;
        }
        Commands::Stats(args) => {
            let service = query_service(store, &config);
            StatsCommand::new(&service).execute(&mut stdout, &format, &args)?;
        }
        Commands::Clear(args) => {
            ClearCommand::new(&store).execute(&mut stdout, &format, &args)?;
        }
        Commands::Export(args) => {
            ExportCommand::new(&store).execute(&mut stdout, &format, &args)?;
        }
        Commands::Collect(args) => {
            let cmd = CollectCommand::new(&store, &config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Watch(args) => {
            let cmd = WatchCommand::new(&store, &config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
        Commands::Emit(args) => {
            EmitCommand::new(&store, &config).execute(&mut stdout, &format, &args)?;
        }
    }

    Ok(())
}
