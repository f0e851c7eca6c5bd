//! Turning templates into commands ready to execute.
//!
//! Three strategies share the [`ArgFormatter`] trait:
//!
//! - [`PosixFormatter`] builds one command line for a POSIX shell, quoting
//!   every interpolated value with ANSI-C `$'...'` quoting.
//! - [`WindowsFormatter`] builds one command line for `cmd.exe /s /c`.
//! - [`DirectFormatter`] runs without a shell: literal text is tokenised and
//!   each interpolated value becomes exactly one argument.
//!
//! # Windows quoting strategy
//!
//! `cmd.exe` offers no escape that neutralises every metacharacter inside a
//! quoted string. Values are wrapped in double quotes with embedded quotes
//! doubled, which keeps spaces, `&`, `|`, `<` and `>` literal. Percent
//! expansion (`%VAR%`), delayed expansion (`!VAR!`) and carets are still
//! processed by `cmd.exe`, so untrusted data containing them is not fully
//! neutralised on that shell. Prefer [`DirectFormatter`] for untrusted values
//! on Windows.

mod direct;
mod posix;
mod windows;

pub use direct::{DirectFormatter, tokenize};
pub use posix::{PosixFormatter, quote_ansi_c};
pub use windows::{WindowsFormatter, quote_cmd};

use crate::{
    error::ShellError,
    options::{ShellOptions, ShellSetting},
    raw::{Flat, flatten},
    template::{Slot, Template},
};

/// How a [`FormattedCommand`] is launched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Launch {
    /// `command` is a full line handed to the configured POSIX shell.
    Shell,
    /// `command` is `cmd.exe`; the last argument is the full line.
    WindowsShell,
    /// `command` is the program and `argv` its arguments.
    Direct,
}

/// Output of a formatter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedCommand {
    /// Shell line, `cmd.exe`, or the program to execute.
    pub command: String,
    /// Arguments; empty for [`Launch::Shell`].
    pub argv: Vec<String>,
    /// Launch strategy.
    pub launch: Launch,
}

impl FormattedCommand {
    /// Human-readable rendering used in logs.
    #[must_use]
    pub fn display(&self) -> String {
        match self.launch {
            Launch::Shell => self.command.clone(),
            Launch::WindowsShell => self.argv.last().cloned().unwrap_or_default(),
            Launch::Direct => std::iter::once(self.command.as_str())
                .chain(self.argv.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A strategy turning a [`Template`] into a [`FormattedCommand`].
pub trait ArgFormatter {
    /// Format `template`.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::QuoteParse`] or [`ShellError::EmptyCommand`] when
    /// a direct-mode template cannot be tokenised.
    fn format(&self, template: &Template) -> Result<FormattedCommand, ShellError>;
}

/// The formatter chosen for a set of options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Formatter {
    /// See [`PosixFormatter`].
    Posix(PosixFormatter),
    /// See [`WindowsFormatter`].
    Windows(WindowsFormatter),
    /// See [`DirectFormatter`].
    Direct(DirectFormatter),
}

impl Formatter {
    /// Pick the formatter for `options` on the current host.
    #[must_use]
    pub fn select(options: &ShellOptions) -> Self {
        Self::select_for(options.shell_setting(), cfg!(windows))
    }

    /// Pick the formatter for `shell` as if running on Windows when
    /// `windows_host` is set.
    #[must_use]
    pub fn select_for(shell: &ShellSetting, windows_host: bool) -> Self {
        if matches!(shell, ShellSetting::Disabled) {
            Self::Direct(DirectFormatter)
        } else if is_posix_mode(shell, windows_host) {
            Self::Posix(PosixFormatter)
        } else {
            Self::Windows(WindowsFormatter)
        }
    }
}

impl ArgFormatter for Formatter {
    fn format(&self, template: &Template) -> Result<FormattedCommand, ShellError> {
        let formatted = match self {
            Self::Posix(formatter) => formatter.format(template),
            Self::Windows(formatter) => formatter.format(template),
            Self::Direct(formatter) => formatter.format(template),
        }?;
        tracing::debug!(command = %formatted.display(), launch = ?formatted.launch, "formatted command");
        Ok(formatted)
    }
}

/// Whether commands are written for a POSIX shell.
///
/// Non-Windows hosts always are; on Windows only an explicitly configured
/// shell other than `cmd.exe` is.
#[must_use]
pub fn is_posix_mode(shell: &ShellSetting, windows_host: bool) -> bool {
    if !windows_host {
        return true;
    }
    match shell {
        ShellSetting::Program(program) => !program.to_ascii_lowercase().contains("cmd.exe"),
        ShellSetting::Default | ShellSetting::Disabled => false,
    }
}

/// Concatenate fragments with each slot's flattened values joined by single
/// spaces, quoting literals with `quote`.
fn join_line(template: &Template, quote: impl Fn(&str) -> String) -> String {
    let mut line = String::new();
    for (fragment, slot) in template.parts() {
        line.push_str(fragment);
        if let Some(slot) = slot {
            push_slot(&mut line, slot, &quote);
        }
    }
    line
}

fn push_slot(line: &mut String, slot: &Slot, quote: &impl Fn(&str) -> String) {
    for (index, value) in flatten(slot.values()).into_iter().enumerate() {
        if index > 0 {
            line.push(' ');
        }
        match value {
            Flat::Raw(text) => line.push_str(text),
            Flat::Literal(text) => line.push_str(&quote(text)),
        }
    }
}
