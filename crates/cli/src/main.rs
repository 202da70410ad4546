use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use earthfetch_cli::commands::{self, Cli};
use earthfetch_cli::exit_code::ExitCode;

const DEBUG_FILTER: &str = "ef_core=debug,ef_s3=debug,earthfetch_cli=debug";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let exit_code = tokio::select! {
        code = commands::execute(cli) => code,
        _ = tokio::signal::ctrl_c() => ExitCode::Interrupted,
    };
    std::process::exit(exit_code.as_i32());
}
