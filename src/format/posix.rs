//! ANSI-C quoting for POSIX shells.

use super::{ArgFormatter, FormattedCommand, Launch, join_line};
use crate::{error::ShellError, template::Template};

/// Formats templates into a single line for a POSIX shell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PosixFormatter;

impl ArgFormatter for PosixFormatter {
    fn format(&self, template: &Template) -> Result<FormattedCommand, ShellError> {
        Ok(FormattedCommand {
            command: join_line(template, quote_ansi_c),
            argv: Vec::new(),
            launch: Launch::Shell,
        })
    }
}

/// Quote `value` as an ANSI-C string (`$'...'`).
///
/// Backslash, single quote, double quote, newline, carriage return and tab are
/// backslash-escaped; everything else is kept as is. Each input character is
/// visited once, so no escape is ever doubled.
///
/// # Examples
///
/// ```
/// use shex::format::quote_ansi_c;
///
/// assert_eq!(quote_ansi_c("it's\n"), r"$'it\'s\n'");
/// ```
#[must_use]
pub fn quote_ansi_c(value: &str) -> String {
    let mut buf = String::with_capacity(value.len() + 3);
    buf.push_str("$'");
    for ch in value.chars() {
        match ch {
            '\\' => buf.push_str("\\\\"),
            '\'' => buf.push_str("\\'"),
            '"' => buf.push_str("\\\""),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            _ => buf.push(ch),
        }
    }
    buf.push('\'');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cmd, raw::raw};
    use anyhow::{Result, ensure};

    #[test]
    fn quote_escapes_ansi_c_specials() -> Result<()> {
        let cases = [
            ("simple", "$'simple'"),
            ("", "$''"),
            ("two words", "$'two words'"),
            (r"back\slash", r"$'back\\slash'"),
            ("it's", r"$'it\'s'"),
            ("say \"hi\"", r#"$'say \"hi\"'"#),
            ("line\nbreak", r"$'line\nbreak'"),
            ("cr\rlf", r"$'cr\rlf'"),
            ("tab\there", r"$'tab\there'"),
            (r"\n", r"$'\\n'"),
            ("$(rm -rf /); `x` | y", "$'$(rm -rf /); `x` | y'"),
        ];
        for (input, expected) in cases {
            let actual = quote_ansi_c(input);
            ensure!(
                actual == expected,
                "quote_ansi_c({input:?}) -> {actual:?}, expected {expected:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn slot_values_are_joined_with_spaces() -> Result<()> {
        let template = cmd!(
            "ls {} {}",
            vec!["a b", "c"],
            raw(vec!["| wc", "-l"])
        )?;
        let formatted = PosixFormatter.format(&template)?;
        ensure!(formatted.command == "ls $'a b' $'c' | wc -l");
        ensure!(formatted.argv.is_empty());
        ensure!(formatted.launch == Launch::Shell);
        Ok(())
    }

    #[test]
    fn empty_slot_contributes_nothing() -> Result<()> {
        let template = cmd!("echo {}!", Vec::<String>::new())?;
        let formatted = PosixFormatter.format(&template)?;
        ensure!(formatted.command == "echo !");
        Ok(())
    }
}
