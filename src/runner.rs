//! CLI execution.
//!
//! Keeps `main` minimal: builds the template and options from the parsed
//! [`Cli`], runs the command through a deferred handle on a single-threaded
//! runtime and forwards the captured output.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::debug;

use crate::{Shell, ShellError, cli::Cli, output::ProcessOutput};

/// Exit code reported when the child died from a signal.
pub const SIGNALLED_EXIT_CODE: u8 = 1;

/// Execute the parsed [`Cli`] and return the exit code to report.
///
/// The child's exit status becomes the exit code. Without `--nothrow` a
/// nonzero exit is also logged as an error.
///
/// # Errors
///
/// Returns an error if the template is malformed, the runtime cannot start
/// or the command cannot be launched.
pub fn run(cli: &Cli) -> Result<u8> {
    let shell = Shell::new(cli.options());
    let template = cli.build_template().context("building command template")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    let handle = shell.spawn(&template)?;
    debug!(command = %handle.command().display(), "command prepared");
    let result = runtime.block_on(async { (&handle).await });
    let output = match &result {
        Ok(output) => output.clone(),
        Err(ShellError::ExitStatus { .. }) => handle.output_snapshot(),
        Err(_) => ProcessOutput::default(),
    };
    forward(cli, &output).context("writing command output")?;
    match result {
        Ok(_) => Ok(exit_code(&output)),
        Err(err @ ShellError::ExitStatus { .. }) => {
            tracing::error!(error = %err, "command failed");
            Ok(exit_code(&output))
        }
        Err(err) => Err(err.into()),
    }
}

fn forward(cli: &Cli, output: &ProcessOutput) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut stdout, output)?;
        writeln!(stdout)?;
    } else {
        stdout.write_all(&output.stdout)?;
        io::stderr().lock().write_all(&output.stderr)?;
    }
    stdout.flush()
}

fn exit_code(output: &ProcessOutput) -> u8 {
    output
        .status
        .map_or(SIGNALLED_EXIT_CODE, |status| {
            u8::try_from(status).unwrap_or(SIGNALLED_EXIT_CODE)
        })
}
