//! Process construction shared by both execution paths, and the synchronous
//! path itself.

use std::{
    fs,
    io::{self, Write},
    process::{Child, Command},
    thread,
};

use camino::Utf8PathBuf;

use crate::{
    error::ShellError,
    format::{FormattedCommand, Launch},
    options::{DEFAULT_POSIX_SHELL, ShellOptions, ShellSetting, StdioMode},
    output::ProcessOutput,
};

/// Build the OS command for `formatted` under `options`.
///
/// The configured environment is layered over the inherited one.
pub(crate) fn build_command(formatted: &FormattedCommand, options: &ShellOptions) -> Command {
    let mut cmd = match formatted.launch {
        Launch::Shell => {
            let mut cmd = Command::new(posix_shell(options.shell_setting()));
            cmd.arg("-c").arg(&formatted.command);
            cmd
        }
        Launch::WindowsShell => windows_shell_command(formatted),
        Launch::Direct => {
            let mut cmd = Command::new(&formatted.command);
            cmd.args(&formatted.argv);
            cmd
        }
    };

    if let Some(cwd) = options.working_dir() {
        cmd.current_dir(cwd.as_std_path());
    }
    cmd.envs(&options.env);
    let [stdin, stdout, stderr] = options.stdio_modes();
    cmd.stdin(stdin.to_stdio())
        .stdout(stdout.to_stdio())
        .stderr(stderr.to_stdio());
    cmd
}

fn posix_shell(shell: &ShellSetting) -> &str {
    match shell {
        ShellSetting::Program(program) => program,
        ShellSetting::Default | ShellSetting::Disabled => DEFAULT_POSIX_SHELL,
    }
}

#[cfg(windows)]
fn windows_shell_command(formatted: &FormattedCommand) -> Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = Command::new(&formatted.command);
    let (line, flags) = formatted
        .argv
        .split_last()
        .map_or(("", formatted.argv.as_slice()), |(line, flags)| {
            (line.as_str(), flags)
        });
    cmd.args(flags);
    // `/s` strips exactly one pair of outer quotes, so the line reaches
    // `cmd.exe` untouched by the MSVC argument quoting rules.
    cmd.raw_arg(format!("\"{line}\""));
    cmd
}

#[cfg(not(windows))]
fn windows_shell_command(formatted: &FormattedCommand) -> Command {
    let mut cmd = Command::new(&formatted.command);
    cmd.args(&formatted.argv);
    cmd
}

/// Describe a launch failure, noting a configured working directory that
/// does not exist when the OS reports "not found".
pub(crate) fn launch_error(
    formatted: &FormattedCommand,
    options: &ShellOptions,
    err: io::Error,
) -> ShellError {
    let missing_cwd = if err.kind() == io::ErrorKind::NotFound {
        options
            .working_dir()
            .filter(|cwd| fs::metadata(cwd.as_std_path()).is_err())
            .map(Utf8PathBuf::from)
    } else {
        None
    };
    tracing::debug!(command = %formatted.display(), ?missing_cwd, "launch failed: {err}");
    ShellError::Launch {
        command: program_name(formatted, options).to_owned(),
        missing_cwd,
        source: std::sync::Arc::new(err),
    }
}

fn program_name<'a>(formatted: &'a FormattedCommand, options: &'a ShellOptions) -> &'a str {
    match formatted.launch {
        Launch::Shell => posix_shell(options.shell_setting()),
        Launch::WindowsShell | Launch::Direct => &formatted.command,
    }
}

pub(crate) fn log_command_execution(formatted: &FormattedCommand, options: &ShellOptions) {
    tracing::info!(
        cwd = ?options.working_dir(),
        "Running command: {}",
        formatted.display()
    );
}

/// Nonzero exits are failures unless tolerated; signal deaths are not.
pub(crate) fn check_exit(output: &ProcessOutput, tolerate_nonzero: bool) -> Result<(), ShellError> {
    match output.status {
        Some(status) if status != 0 && !tolerate_nonzero => Err(ShellError::ExitStatus {
            status,
            stderr: output.stderr_text().trim().to_owned(),
        }),
        _ => Ok(()),
    }
}

/// Run `formatted` to completion on the calling thread.
///
/// # Errors
///
/// Returns [`ShellError::Launch`] when the process cannot start,
/// [`ShellError::ExitStatus`] for nonzero exits unless tolerated, and
/// [`ShellError::Io`] when waiting on the process fails.
pub fn run_sync(
    formatted: &FormattedCommand,
    options: &ShellOptions,
) -> Result<ProcessOutput, ShellError> {
    let mut cmd = build_command(formatted, options);
    log_command_execution(formatted, options);
    let mut child = cmd
        .spawn()
        .map_err(|err| launch_error(formatted, options, err))?;

    let stdin_writer = feed_stdin(&mut child, options);
    let waited = child
        .wait_with_output()
        .map_err(|err| ShellError::io(&formatted.command, err))?;
    join_stdin_writer(stdin_writer, &formatted.command)?;

    let mut output = ProcessOutput::empty(options.encoding);
    output.record_exit(waited.status);
    output.stdout = waited.stdout;
    output.stderr = waited.stderr;
    check_exit(&output, options.tolerates_nonzero())?;
    Ok(output)
}

fn feed_stdin(
    child: &mut Child,
    options: &ShellOptions,
) -> Option<thread::JoinHandle<io::Result<()>>> {
    let input = options.input.clone()?;
    let [stdin_mode, _, _] = options.stdio_modes();
    debug_assert_eq!(stdin_mode, StdioMode::Pipe, "input forces a stdin pipe");
    child
        .stdin
        .take()
        .map(|mut stdin| thread::spawn(move || stdin.write_all(&input)))
}

fn join_stdin_writer(
    writer: Option<thread::JoinHandle<io::Result<()>>>,
    command: &str,
) -> Result<(), ShellError> {
    let Some(handle) = writer else {
        return Ok(());
    };
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("{command} closed stdin before consuming all input");
            Ok(())
        }
        Ok(Err(err)) => Err(ShellError::io(command, err)),
        Err(_) => Err(ShellError::io(
            command,
            io::Error::other("stdin writer panicked"),
        )),
    }
}
