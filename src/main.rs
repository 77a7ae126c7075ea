use androsh::core::output;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = androsh::Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match androsh::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&output::compact_line(&err.to_string(), 400));
            ExitCode::FAILURE
        }
    }
}
