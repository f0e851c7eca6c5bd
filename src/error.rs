//! Error type shared by formatting, launching and awaiting commands.
//!
//! Settled process handles hand the same error to every awaiting clone, so
//! I/O sources are kept behind [`Arc`] and the whole type is [`Clone`].

// Scoped suppression for version-dependent lint false positives from
// miette/thiserror derive macros.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::{io, sync::Arc};

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Failures raised while building or running a command.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ShellError {
    /// The operating system could not create the process.
    #[error("failed to launch `{command}`: {source}{}", cwd_suffix(.missing_cwd.as_ref()))]
    #[diagnostic(
        code(shex::launch),
        help("check that the program exists, is executable, and that the working directory exists")
    )]
    Launch {
        /// Program that failed to start.
        command: String,
        /// Configured working directory when it does not exist.
        missing_cwd: Option<Utf8PathBuf>,
        /// Underlying OS error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The process exited with a nonzero status and nonzero exits were not
    /// tolerated.
    #[error("command exited with non-zero status code ({status})")]
    #[diagnostic(code(shex::exit_status))]
    ExitStatus {
        /// Exit status reported by the process.
        status: i32,
        /// Trimmed, lossily decoded stderr captured before the exit.
        stderr: String,
    },
    /// Stdin was requested after the process started without a stdin pipe.
    #[error(
        "can't write to stdin: the process already started with stdin set to `{mode}`"
    )]
    #[diagnostic(
        code(shex::stdio_conflict),
        help("request stdin before the process spawns, or configure stdin as `pipe`")
    )]
    StdioConfigConflict {
        /// Stdin mode the process was started with.
        mode: &'static str,
    },
    /// A literal fragment of a direct-mode template left a quote open.
    #[error("invalid command: quotes around interpolated values are not supported (in `{text}`)")]
    #[diagnostic(
        code(shex::quote_parse),
        help("interpolated values are passed as single arguments already; drop the surrounding quotes")
    )]
    QuoteParse {
        /// Literal text being tokenised when the quote was left open.
        text: String,
    },
    /// Fragment and slot counts do not line up.
    #[error("template has {fragments} fragments but {slots} interpolation slots")]
    #[diagnostic(code(shex::template_arity))]
    TemplateArity {
        /// Number of literal fragments.
        fragments: usize,
        /// Number of interpolation slots.
        slots: usize,
    },
    /// A direct-mode template produced no program to run.
    #[error("no command specified to run")]
    #[diagnostic(code(shex::empty_command))]
    EmptyCommand,
    /// Copying output into a pipe destination failed.
    #[error("pipe into {destination} failed: {source}")]
    #[diagnostic(code(shex::pipe))]
    Pipe {
        /// Description of the destination.
        destination: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A pipe was taken from a destination that produces no output.
    #[error("cannot pipe onwards from a write-only sink")]
    #[diagnostic(
        code(shex::sink_not_readable),
        help("use `pipe_through` with a readable stage to keep piping")
    )]
    SinkNotReadable,
    /// A pipe destination's stdin writer was already handed out.
    #[error("cannot pipe into `{command}`: its stdin is already in use")]
    #[diagnostic(
        code(shex::stdin_taken),
        help("each process accepts one pipe or `input` on stdin; merge sources before piping")
    )]
    StdinTaken {
        /// Destination command.
        command: String,
    },
    /// A pipe was requested from a stream that is not piped.
    #[error("cannot pipe from {stream}: the stream is not configured as `pipe`")]
    #[diagnostic(code(shex::not_piped))]
    NotPiped {
        /// Name of the stream.
        stream: &'static str,
    },
    /// A process handle needed a Tokio runtime to start its child.
    #[error("process handles must be used within a Tokio runtime")]
    #[diagnostic(
        code(shex::no_runtime),
        help("await the handle inside a Tokio runtime, or use `Shell::run` for blocking execution")
    )]
    NoRuntime,
    /// Any other I/O failure while interacting with the process.
    #[error("I/O error while running `{command}`: {source}")]
    #[diagnostic(code(shex::io))]
    Io {
        /// Program being run.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

fn cwd_suffix(missing_cwd: Option<&Utf8PathBuf>) -> String {
    missing_cwd.map_or_else(String::new, |cwd| format!(": cwd: {cwd}"))
}

impl ShellError {
    pub(crate) fn io(command: &str, source: io::Error) -> Self {
        Self::Io {
            command: command.to_owned(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn pipe(destination: &'static str, source: io::Error) -> Self {
        Self::Pipe {
            destination,
            source: Arc::new(source),
        }
    }

    /// Exit status carried by an [`ShellError::ExitStatus`] failure.
    #[must_use]
    pub const fn exit_status(&self) -> Option<i32> {
        match self {
            Self::ExitStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
