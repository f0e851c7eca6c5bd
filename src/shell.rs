//! The execution context tying options, formatting and launching together.
//!
//! A [`Shell`] is an immutable value: [`Shell::cd`] and
//! [`Shell::with_options`] return derived contexts and leave the parent
//! untouched, so a context can be shared freely between tasks.

use camino::Utf8PathBuf;

use crate::{
    error::ShellError,
    exec::run_sync,
    format::{ArgFormatter, FormattedCommand, Formatter, is_posix_mode},
    options::{OptionsPatch, ShellOptions},
    output::ProcessOutput,
    process::ProcessHandle,
    template::Template,
};

/// Options plus the operations that use them.
///
/// # Examples
///
/// ```no_run
/// use shex::{Shell, cmd};
///
/// # async fn demo() -> Result<(), shex::ShellError> {
/// let shell = Shell::default().cd("/tmp");
/// let listing = shell.spawn(&cmd!("ls -l {}", "my dir")?)?;
/// let counted = listing.pipe_command("wc -l")?.await?;
/// println!("{}", counted.stdout_text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shell {
    options: ShellOptions,
}

impl Shell {
    /// A context using `options`.
    #[must_use]
    pub const fn new(options: ShellOptions) -> Self {
        Self { options }
    }

    /// Options applied by this context.
    #[must_use]
    pub const fn options(&self) -> &ShellOptions {
        &self.options
    }

    /// A child context with `patch` merged over these options.
    #[must_use]
    pub fn with_options(&self, patch: &OptionsPatch) -> Self {
        Self::new(self.options.merged(patch))
    }

    /// A child context in `dir`, resolved against the current working
    /// directory of this context when relative.
    #[must_use]
    pub fn cd(&self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.with_options(&OptionsPatch::cwd(dir))
    }

    /// Run `body` with a child context built from `patch`.
    pub fn scoped<T>(&self, patch: &OptionsPatch, body: impl FnOnce(&Self) -> T) -> T {
        body(&self.with_options(patch))
    }

    /// Whether templates are formatted for a POSIX shell on this host.
    #[must_use]
    pub fn is_posix_mode(&self) -> bool {
        is_posix_mode(self.options.shell_setting(), cfg!(windows))
    }

    /// Formatter selected by these options.
    #[must_use]
    pub fn formatter(&self) -> Formatter {
        Formatter::select(&self.options)
    }

    /// Format `template` without running it.
    ///
    /// # Errors
    ///
    /// Formatting errors from the selected [`Formatter`].
    pub fn format(&self, template: &Template) -> Result<FormattedCommand, ShellError> {
        self.formatter().format(template)
    }

    /// Run `template` to completion, blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Formatting errors, [`ShellError::Launch`], and
    /// [`ShellError::ExitStatus`] for nonzero exits unless tolerated.
    pub fn run(&self, template: &Template) -> Result<ProcessOutput, ShellError> {
        let formatted = self.format(template)?;
        run_sync(&formatted, &self.options)
    }

    /// Create a deferred handle for `template`.
    ///
    /// # Errors
    ///
    /// Formatting errors only; launch failures settle the handle.
    pub fn spawn(&self, template: &Template) -> Result<ProcessHandle, ShellError> {
        let formatted = self.format(template)?;
        Ok(ProcessHandle::with_factory(
            formatted,
            self.options.clone(),
            self.clone(),
        ))
    }

    /// Run a literal command line to completion.
    ///
    /// # Errors
    ///
    /// As for [`Self::run`].
    pub fn run_line(&self, line: &str) -> Result<ProcessOutput, ShellError> {
        self.run(&Template::literal(line))
    }

    /// Create a deferred handle for a literal command line.
    ///
    /// # Errors
    ///
    /// As for [`Self::spawn`].
    pub fn spawn_line(&self, line: &str) -> Result<ProcessHandle, ShellError> {
        self.spawn(&Template::literal(line))
    }
}
