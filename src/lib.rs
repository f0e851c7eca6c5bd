//! Shex core library.
//!
//! Build shell commands from templates without shell injection, then run
//! them to completion or as deferred, awaitable process handles that can be
//! piped into each other or into any async writer.
//!
//! Interpolated values are escaped for the selected shell: ANSI-C quoting for
//! POSIX shells, doubled double quotes for `cmd.exe`, or no shell at all, in
//! which case every value becomes exactly one argument. Values wrapped with
//! [`raw::raw`] are inserted verbatim.
//!
//! ```no_run
//! use shex::{Shell, cmd, raw::raw};
//!
//! # fn demo() -> Result<(), shex::ShellError> {
//! let shell = Shell::default();
//! let output = shell.run(&cmd!("grep -c {} {}", "needle; rm -rf /", raw("*.log"))?)?;
//! assert!(output.success());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod error;
pub mod exec;
pub mod format;
pub mod options;
pub mod output;
pub mod process;
pub mod raw;
pub mod runner;
pub mod shell;
pub mod template;

pub use error::ShellError;
pub use format::{ArgFormatter, FormattedCommand, Formatter, Launch};
pub use options::{Encoding, OptionsPatch, ShellOptions, ShellSetting, StdioMode};
pub use output::ProcessOutput;
pub use process::{OutputTap, ProcessHandle, SinkPipe};
pub use raw::RawValue;
pub use shell::Shell;
pub use template::{Slot, Template};
