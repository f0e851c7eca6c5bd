//! Captured result of a finished (or running) process.

use std::{borrow::Cow, process::ExitStatus};

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::options::Encoding;

/// Exit information and captured output of a process.
///
/// While a handle is running this is filled in as output arrives; once the
/// handle settles callers only ever see clones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status, `None` when the process was killed by a signal or has not
    /// exited yet.
    pub status: Option<i32>,
    /// Name of the terminating signal, if any.
    pub signal: Option<String>,
    /// Captured stdout bytes.
    pub stdout: Vec<u8>,
    /// Captured stderr bytes.
    pub stderr: Vec<u8>,
    /// Encoding used by [`Self::stdout_text`] and [`Self::stderr_text`].
    pub encoding: Encoding,
}

impl ProcessOutput {
    pub(crate) fn empty(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    /// Captured stdout decoded with the configured encoding.
    #[must_use]
    pub fn stdout_text(&self) -> Cow<'_, str> {
        self.encoding.decode(&self.stdout)
    }

    /// Captured stderr decoded with the configured encoding.
    #[must_use]
    pub fn stderr_text(&self) -> Cow<'_, str> {
        self.encoding.decode(&self.stderr)
    }

    /// Whether the process exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    pub(crate) fn record_exit(&mut self, exit: ExitStatus) {
        self.status = exit.code();
        self.signal = signal_name(exit);
    }
}

impl Serialize for ProcessOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ProcessOutput", 4)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("signal", &self.signal)?;
        state.serialize_field("stdout", &self.stdout_text())?;
        state.serialize_field("stderr", &self.stderr_text())?;
        state.end()
    }
}

#[cfg(unix)]
fn signal_name(exit: ExitStatus) -> Option<String> {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    exit.signal().map(|raw| {
        Signal::try_from(raw).map_or_else(|_| format!("signal {raw}"), |sig| sig.as_str().to_owned())
    })
}

#[cfg(not(unix))]
fn signal_name(_exit: ExitStatus) -> Option<String> {
    None
}
