//! Double-quote formatting for `cmd.exe`.

use super::{ArgFormatter, FormattedCommand, Launch, join_line};
use crate::{error::ShellError, template::Template};

/// Program launched for Windows shell lines.
pub const CMD_PROGRAM: &str = "cmd.exe";

/// Formats templates into a line executed by `cmd.exe /s /c`.
///
/// See the [module documentation](super) for the limits of this quoting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowsFormatter;

impl ArgFormatter for WindowsFormatter {
    fn format(&self, template: &Template) -> Result<FormattedCommand, ShellError> {
        let line = join_line(template, quote_cmd);
        Ok(FormattedCommand {
            command: CMD_PROGRAM.to_owned(),
            argv: vec!["/s".to_owned(), "/c".to_owned(), line],
            launch: Launch::WindowsShell,
        })
    }
}

/// Wrap `value` in double quotes, doubling embedded double quotes.
///
/// Backslashes are left alone because `cmd.exe` does not treat them as
/// escapes.
#[must_use]
pub fn quote_cmd(value: &str) -> String {
    let mut buf = String::with_capacity(value.len() + 2);
    buf.push('"');
    for ch in value.chars() {
        if ch == '"' {
            buf.push('"');
        }
        buf.push(ch);
    }
    buf.push('"');
    buf
}
