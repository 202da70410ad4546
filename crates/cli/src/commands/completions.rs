//! completions command - Shell completion scripts

use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_complete::Shell;

use super::Cli;
use crate::exit_code::ExitCode;

/// Generate shell completions
#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

fn render(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, out);
}

pub fn execute(args: CompletionsArgs) -> ExitCode {
    let Some(path) = args.output else {
        render(args.shell, &mut std::io::stdout());
        return ExitCode::Success;
    };

    let mut script = Vec::new();
    render(args.shell, &mut script);
    match std::fs::write(&path, script) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("Failed to write {}: {e}", path.display());
            ExitCode::GeneralError
        }
    }
}
