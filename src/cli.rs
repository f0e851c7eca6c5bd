//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure for the `shex` binary.

use camino::Utf8PathBuf;
use clap::Parser;

use crate::{
    options::{Encoding, OptionsPatch, ShellOptions, ShellSetting},
    raw::RawValue,
    template::{Slot, Template},
};

fn parse_env(s: &str) -> Result<(String, String), String> {
    let Some((key, value)) = s.split_once('=') else {
        return Err(format!("{s} is not a KEY=VALUE pair"));
    };
    if key.is_empty() {
        return Err(format!("{s} has an empty variable name"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

/// Run a command template with safely escaped values.
///
/// Every `{}` in the template is replaced by the next value, quoted for the
/// shell in use.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run the command in this directory.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub cwd: Option<Utf8PathBuf>,

    /// Set an environment variable for the command.
    #[arg(short, long, value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Run the command without a shell.
    #[arg(long, conflicts_with = "shell")]
    pub no_shell: bool,

    /// Shell program used to run the command line.
    #[arg(long, value_name = "PROG")]
    pub shell: Option<String>,

    /// Report nonzero exits through the exit code instead of as an error.
    #[arg(long)]
    pub nothrow: bool,

    /// Print the captured result as JSON.
    #[arg(long)]
    pub json: bool,

    /// Insert values verbatim instead of escaping them.
    #[arg(long)]
    pub raw: bool,

    /// Encoding used to decode captured output.
    #[arg(long, value_name = "ENCODING", default_value = "utf8")]
    pub encoding: Encoding,

    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Command template with `{}` placeholders.
    #[arg(value_name = "TEMPLATE")]
    pub template: String,

    /// Values substituted into the placeholders, in order.
    #[arg(value_name = "VALUE", trailing_var_arg = true, allow_hyphen_values = true)]
    pub values: Vec<String>,
}

impl Cli {
    /// Parse the provided arguments.
    ///
    /// # Panics
    ///
    /// Panics if argument parsing fails.
    #[must_use]
    pub fn parse_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).unwrap_or_else(|e| panic!("CLI parsing failed: {e}"))
    }

    /// Execution options selected by the flags.
    #[must_use]
    pub fn options(&self) -> ShellOptions {
        let shell = if self.no_shell {
            ShellSetting::Disabled
        } else {
            self.shell
                .clone()
                .map_or(ShellSetting::Default, ShellSetting::Program)
        };
        let patch = OptionsPatch {
            cwd: self.cwd.clone(),
            env: self.env.iter().cloned().collect(),
            encoding: Some(self.encoding),
            tolerate_nonzero: Some(self.nothrow),
            shell: Some(shell),
            ..OptionsPatch::default()
        };
        ShellOptions::new().merged(&patch)
    }

    /// The template with every value placed in its slot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ShellError::TemplateArity`] when the number of values
    /// does not match the placeholders.
    pub fn build_template(&self) -> Result<Template, crate::ShellError> {
        let slots = self
            .values
            .iter()
            .map(|value| {
                Slot::from(if self.raw {
                    RawValue::raw(value.as_str())
                } else {
                    RawValue::literal(value.as_str())
                })
            })
            .collect();
        Template::parse(&self.template, slots)
    }
}
