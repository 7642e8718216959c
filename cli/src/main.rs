use clap::{CommandFactory, Parser};
use libhmv::StatePaths;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod render;

const DEFAULT_LOG_FILTER: &str = "libhmv=debug,hmv=debug";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let Some(command) = cli.command else {
        if let Err(e) = cli::Cli::command().print_help() {
            eprintln!("{e}");
        }
        return ExitCode::SUCCESS;
    };

    let paths = StatePaths::from_home();
    let log_dir = match &paths {
        Ok(p) => p.log_dir.clone(),
        Err(_) => PathBuf::from("."),
    };
    let f_appender = tracing_appender::rolling::daily(log_dir, "hmv.log");
    let (non_blk, _guard) = tracing_appender::non_blocking(f_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .event_format(tracing_subscriber::fmt::format().pretty())
        .with_writer(non_blk)
        .init();

    match paths {
        Ok(paths) => ExitCode::from(cli::execute(command, paths).await),
        Err(e) => {
            render::failure(&e);
            ExitCode::FAILURE
        }
    }
}
