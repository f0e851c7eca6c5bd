//! Execution options: stdio wiring, environment, working directory, encoding
//! and shell selection.

use std::{borrow::Cow, collections::BTreeMap, env, fmt, str::FromStr};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// How one standard stream of the child is wired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// Share the parent's stream.
    #[default]
    Inherit,
    /// Connect a pipe the caller (or the aggregator) can use.
    Pipe,
    /// Connect the null device.
    Ignore,
}

impl StdioMode {
    /// Lower-case name used in messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Inherit => "inherit",
            Self::Pipe => "pipe",
            Self::Ignore => "ignore",
        }
    }

    pub(crate) fn to_stdio(self) -> std::process::Stdio {
        match self {
            Self::Inherit => std::process::Stdio::inherit(),
            Self::Pipe => std::process::Stdio::piped(),
            Self::Ignore => std::process::Stdio::null(),
        }
    }
}

impl fmt::Display for StdioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl FromStr for StdioMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inherit" => Ok(Self::Inherit),
            "pipe" => Ok(Self::Pipe),
            "ignore" => Ok(Self::Ignore),
            other => Err(format!("unsupported stdio mode '{other}'")),
        }
    }
}

/// Text encoding used to decode captured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// UTF-8, invalid sequences replaced with U+FFFD.
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl Encoding {
    /// Decode `bytes`.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes),
            Self::Latin1 => Cow::Owned(bytes.iter().copied().map(char::from).collect()),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "latin1" | "iso-8859-1" | "binary" => Ok(Self::Latin1),
            other => Err(format!("unsupported encoding '{other}'")),
        }
    }
}

/// Which shell, if any, runs formatted commands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShellSetting {
    /// `bash` on POSIX hosts, `cmd.exe` on Windows.
    #[default]
    Default,
    /// No shell: templates are tokenised into an argument vector.
    Disabled,
    /// A specific shell program, invoked as `<program> -c <line>`.
    Program(String),
}

/// Shell used for POSIX-formatted lines when none is configured.
///
/// The POSIX formatter emits ANSI-C quoted strings, which `bash` understands on
/// every platform it ships on.
pub const DEFAULT_POSIX_SHELL: &str = "bash";

/// Options applied when formatting and launching a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellOptions {
    pub(crate) cwd: Option<Utf8PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) encoding: Encoding,
    pub(crate) stdio: [StdioMode; 3],
    pub(crate) tolerate_nonzero: bool,
    pub(crate) shell: ShellSetting,
    pub(crate) input: Option<Vec<u8>>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            encoding: Encoding::Utf8,
            stdio: [StdioMode::Inherit, StdioMode::Pipe, StdioMode::Pipe],
            tolerate_nonzero: false,
            shell: ShellSetting::Default,
            input: None,
        }
    }
}

impl ShellOptions {
    /// Default options: inherited stdin, piped stdout and stderr, UTF-8.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable layered over the inherited environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the encoding used to decode captured output.
    #[must_use]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the modes for stdin, stdout and stderr.
    #[must_use]
    pub const fn stdio(mut self, stdio: [StdioMode; 3]) -> Self {
        self.stdio = stdio;
        self
    }

    /// Use one mode for all three streams.
    #[must_use]
    pub const fn stdio_all(self, mode: StdioMode) -> Self {
        self.stdio([mode, mode, mode])
    }

    /// Resolve instead of failing when the process exits nonzero.
    #[must_use]
    pub const fn tolerate_nonzero(mut self, tolerate: bool) -> Self {
        self.tolerate_nonzero = tolerate;
        self
    }

    /// Choose the shell.
    #[must_use]
    pub fn shell(mut self, shell: ShellSetting) -> Self {
        self.shell = shell;
        self
    }

    /// Feed `input` to the child's stdin; forces stdin to [`StdioMode::Pipe`].
    #[must_use]
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Configured working directory.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.cwd.as_deref()
    }

    /// Configured stdio modes after applying the `input` override.
    #[must_use]
    pub fn stdio_modes(&self) -> [StdioMode; 3] {
        let [stdin, stdout, stderr] = self.stdio;
        let stdin = if self.input.is_some() {
            StdioMode::Pipe
        } else {
            stdin
        };
        [stdin, stdout, stderr]
    }

    /// Shell selection.
    #[must_use]
    pub const fn shell_setting(&self) -> &ShellSetting {
        &self.shell
    }

    /// Whether nonzero exits resolve instead of failing.
    #[must_use]
    pub const fn tolerates_nonzero(&self) -> bool {
        self.tolerate_nonzero
    }

    /// Layer `overrides` on top of `self`.
    ///
    /// Scalar settings from `overrides` win, environment maps merge key by key
    /// and a relative `cwd` in `overrides` resolves against the base `cwd` (or
    /// the process working directory when the base has none).
    #[must_use]
    pub fn merged(&self, overrides: &OptionsPatch) -> Self {
        let mut merged = self.clone();
        if let Some(cwd) = &overrides.cwd {
            merged.cwd = Some(resolve_cwd(self.cwd.as_deref(), cwd));
        }
        merged
            .env
            .extend(overrides.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(encoding) = overrides.encoding {
            merged.encoding = encoding;
        }
        if let Some(stdio) = overrides.stdio {
            merged.stdio = stdio;
        }
        if let Some(tolerate) = overrides.tolerate_nonzero {
            merged.tolerate_nonzero = tolerate;
        }
        if let Some(shell) = &overrides.shell {
            merged.shell = shell.clone();
        }
        if let Some(input) = &overrides.input {
            merged.input = Some(input.clone());
        }
        merged
    }
}

/// A partial set of options merged over a base with [`ShellOptions::merged`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionsPatch {
    /// Working directory; relative paths resolve against the base.
    pub cwd: Option<Utf8PathBuf>,
    /// Variables merged into the base environment.
    pub env: BTreeMap<String, String>,
    /// Output encoding.
    pub encoding: Option<Encoding>,
    /// Stdio modes.
    pub stdio: Option<[StdioMode; 3]>,
    /// Nonzero exit handling.
    pub tolerate_nonzero: Option<bool>,
    /// Shell selection.
    pub shell: Option<ShellSetting>,
    /// Stdin input.
    pub input: Option<Vec<u8>>,
}

impl OptionsPatch {
    /// A patch that only changes the working directory.
    #[must_use]
    pub fn cwd(cwd: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }
}

fn resolve_cwd(base: Option<&Utf8Path>, next: &Utf8Path) -> Utf8PathBuf {
    if next.is_absolute() {
        return next.to_path_buf();
    }
    match base {
        Some(base) => base.join(next),
        None => env::current_dir()
            .ok()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map_or_else(|| next.to_path_buf(), |dir| dir.join(next)),
    }
}
