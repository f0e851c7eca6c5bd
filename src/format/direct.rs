//! Shell-less formatting: literal text is tokenised, values stay atomic.

use super::{ArgFormatter, FormattedCommand, Launch};
use crate::{error::ShellError, raw::Flat, raw::flatten, template::Template};

/// Builds an argument vector without involving a shell.
///
/// Literal fragments and verbatim values are split into arguments by
/// [`tokenize`]; every non-verbatim value becomes exactly one argument, spaces
/// and quotes included.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectFormatter;

impl ArgFormatter for DirectFormatter {
    fn format(&self, template: &Template) -> Result<FormattedCommand, ShellError> {
        let mut args = Vec::new();
        let mut pending = String::new();

        for (fragment, slot) in template.parts() {
            pending.push_str(fragment);
            let Some(slot) = slot else {
                continue;
            };
            let mut need_space = false;
            for value in flatten(slot.values()) {
                match value {
                    Flat::Raw(text) => {
                        if need_space {
                            pending.push(' ');
                        }
                        pending.push_str(text);
                        need_space = true;
                    }
                    Flat::Literal(text) => {
                        flush(&mut pending, &mut args)?;
                        args.push(text.to_owned());
                    }
                }
            }
        }
        flush(&mut pending, &mut args)?;

        let mut args = args.into_iter();
        let command = args.next().ok_or(ShellError::EmptyCommand)?;
        Ok(FormattedCommand {
            command,
            argv: args.collect(),
            launch: Launch::Direct,
        })
    }
}

fn flush(pending: &mut String, args: &mut Vec<String>) -> Result<(), ShellError> {
    if !pending.is_empty() {
        args.extend(tokenize(pending)?);
        pending.clear();
    }
    Ok(())
}

/// Split literal command text into arguments.
///
/// A backslash passes the next character through unchanged; `'` and `"` open
/// a region, closed by the same quote, in which whitespace does not split;
/// unquoted spaces and tabs separate arguments. Empty arguments are dropped.
///
/// # Errors
///
/// Returns [`ShellError::QuoteParse`] when a quote is left open.
///
/// # Examples
///
/// ```
/// use shex::format::tokenize;
///
/// let args = tokenize(r#"git commit -m "first try" a\ b"#)?;
/// assert_eq!(args, ["git", "commit", "-m", "first try", "a b"]);
/// # Ok::<(), shex::ShellError>(())
/// ```
pub fn tokenize(text: &str) -> Result<Vec<String>, ShellError> {
    let mut args = Vec::new();
    let mut arg = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    arg.push(escaped);
                }
            }
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            _ if quote == Some(ch) => quote = None,
            ' ' | '\t' if quote.is_none() => {
                if !arg.is_empty() {
                    args.push(std::mem::take(&mut arg));
                }
            }
            _ => arg.push(ch),
        }
    }

    if quote.is_some() {
        return Err(ShellError::QuoteParse {
            text: text.to_owned(),
        });
    }
    if !arg.is_empty() {
        args.push(arg);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cmd, raw::raw};
    use anyhow::{Result, bail, ensure};
    use rstest::rstest;

    #[rstest]
    #[case("ls -l", &["ls", "-l"])]
    #[case("  spaced\t\tout  ", &["spaced", "out"])]
    #[case(r#"say "two words""#, &["say", "two words"])]
    #[case("say 'it \"quoted\"'", &["say", "it \"quoted\""])]
    #[case(r"a\ b c", &["a b", "c"])]
    #[case(r#"\"not quoted\""#, &["\"not", "quoted\""])]
    #[case(r"abc\", &["abc"])]
    #[case("pre'fix suf'fix", &["prefix suffix"])]
    #[case("\"\" x", &["x"])]
    fn tokenize_splits_like_a_shell(#[case] input: &str, #[case] expected: &[&str]) -> Result<()> {
        let actual = tokenize(input)?;
        ensure!(actual == expected, "tokenize({input:?}) -> {actual:?}");
        Ok(())
    }

    #[rstest]
    #[case("echo \"open")]
    #[case("echo 'open")]
    #[case("echo \"mixed'")]
    fn tokenize_rejects_open_quotes(#[case] input: &str) {
        assert!(matches!(
            tokenize(input),
            Err(ShellError::QuoteParse { .. })
        ));
    }

    #[test]
    fn values_stay_atomic() -> Result<()> {
        let template = cmd!("run {} --flag={}", "hello world", "x y")?;
        let formatted = DirectFormatter.format(&template)?;
        ensure!(formatted.command == "run");
        ensure!(
            formatted.argv == ["hello world", "--flag=", "x y"],
            "unexpected argv {:?}",
            formatted.argv
        );
        ensure!(formatted.launch == Launch::Direct);
        Ok(())
    }

    #[test]
    fn verbatim_values_are_tokenised_with_the_text() -> Result<()> {
        let template = cmd!("grep {} file", raw(vec!["-i", "-n"]))?;
        let formatted = DirectFormatter.format(&template)?;
        ensure!(formatted.command == "grep");
        ensure!(formatted.argv == ["-i", "-n", "file"]);
        Ok(())
    }

    #[test]
    fn verbatim_text_merges_with_adjacent_literal_text() -> Result<()> {
        let template = cmd!("cp {}.bak dest", raw("name"))?;
        let formatted = DirectFormatter.format(&template)?;
        ensure!(formatted.argv == ["name.bak", "dest"]);
        Ok(())
    }

    #[test]
    fn quotes_around_values_are_rejected() -> Result<()> {
        let template = cmd!("echo \"{}", "x")?;
        match DirectFormatter.format(&template) {
            Err(ShellError::QuoteParse { text }) => {
                ensure!(text == "echo \"", "unexpected text {text:?}");
                Ok(())
            }
            other => bail!("expected quote error, got {other:?}"),
        }
    }

    #[test]
    fn empty_templates_have_no_command() {
        let template = Template::literal("   ");
        assert!(matches!(
            DirectFormatter.format(&template),
            Err(ShellError::EmptyCommand)
        ));
    }
}
