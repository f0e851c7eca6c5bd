//! Deferred process handles.
//!
//! A [`ProcessHandle`] wraps one external process. Creating it does not start
//! the process: the spawn is queued on the Tokio runtime and runs once the
//! creating task yields, so configuration made in the same tick (requesting
//! [`ProcessHandle::stdin`], piping) still shapes how the child is started.
//! Any accessor that needs the child starts it immediately instead.
//!
//! Awaiting a handle yields the [`ProcessOutput`] once the child exits and
//! both output streams have been drained. The handle settles exactly once;
//! every clone observes the same settlement.
//!
//! Handles are meant for a `current_thread` runtime. On a multi-threaded
//! runtime the deferred spawn may run as soon as the creating task yields on
//! another worker, so configure the handle before the first `.await`.

mod pipes;
mod sink;

pub use pipes::OutputTap;
pub use sink::SinkPipe;

use std::{
    fmt,
    future::{Future, IntoFuture},
    io,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    process::{Child, ChildStdin},
    sync::watch,
    task::JoinHandle,
};

use crate::{
    error::ShellError,
    exec::{build_command, check_exit, launch_error, log_command_execution},
    format::FormattedCommand,
    options::{ShellOptions, StdioMode},
    output::ProcessOutput,
    shell::Shell,
    template::Template,
};
use pipes::{OutputStream, TapSet, aggregate};

type Settlement = Option<Result<ProcessOutput, ShellError>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Phase {
    Unspawned,
    Spawned {
        stdin: Option<ChildStdin>,
        pid: Option<u32>,
    },
}

struct Core {
    options: ShellOptions,
    phase: Phase,
}

struct Inner {
    command: FormattedCommand,
    core: Mutex<Core>,
    tolerate_nonzero: AtomicBool,
    output: Arc<Mutex<ProcessOutput>>,
    stdout_taps: Arc<TapSet>,
    stderr_taps: Arc<TapSet>,
    settled: watch::Sender<Settlement>,
    factory: Shell,
}

impl Inner {
    fn taps(&self, stream: OutputStream) -> &Arc<TapSet> {
        match stream {
            OutputStream::Stdout => &self.stdout_taps,
            OutputStream::Stderr => &self.stderr_taps,
        }
    }

    fn settle(&self, result: Result<ProcessOutput, ShellError>) -> bool {
        let settled = self.settled.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        });
        if settled {
            tracing::debug!(command = %self.command.display(), "process handle settled");
        }
        settled
    }

    fn close_taps(&self) {
        self.stdout_taps.close();
        self.stderr_taps.close();
    }
}

/// A lazily spawned external process that can be awaited.
///
/// Cloning is cheap; clones share the process.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("command", &self.inner.command)
            .field("spawned", &self.is_spawned())
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Create a handle for `command`; pipe destinations given as command
    /// lines are formatted with `options`.
    #[must_use]
    pub fn new(command: FormattedCommand, options: ShellOptions) -> Self {
        let factory = Shell::new(options.clone());
        Self::with_factory(command, options, factory)
    }

    pub(crate) fn with_factory(
        command: FormattedCommand,
        options: ShellOptions,
        factory: Shell,
    ) -> Self {
        let (settled, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            tolerate_nonzero: AtomicBool::new(options.tolerates_nonzero()),
            output: Arc::new(Mutex::new(ProcessOutput::empty(options.encoding))),
            command,
            core: Mutex::new(Core {
                options,
                phase: Phase::Unspawned,
            }),
            stdout_taps: Arc::default(),
            stderr_taps: Arc::default(),
            settled,
            factory,
        });
        let handle = Self { inner };
        handle.schedule_spawn();
        handle
    }

    fn schedule_spawn(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime; spawn deferred until first use");
            return;
        };
        let deferred = self.clone();
        runtime.spawn(async move {
            tokio::task::yield_now().await;
            deferred.ensure_spawned();
        });
    }

    /// The formatted command this handle runs.
    #[must_use]
    pub fn command(&self) -> &FormattedCommand {
        &self.inner.command
    }

    /// Whether the process has been started (or failed to start).
    #[must_use]
    pub fn is_spawned(&self) -> bool {
        matches!(lock(&self.inner.core).phase, Phase::Spawned { .. })
    }

    /// Whether the handle has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.settled.borrow().is_some()
    }

    /// OS process id, once spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match lock(&self.inner.core).phase {
            Phase::Spawned { pid, .. } => pid,
            Phase::Unspawned => None,
        }
    }

    /// Output captured so far, complete once the handle has settled.
    ///
    /// Useful for diagnostics after a rejection.
    #[must_use]
    pub fn output_snapshot(&self) -> ProcessOutput {
        lock(&self.inner.output).clone()
    }

    fn ensure_spawned(&self) {
        let mut core = lock(&self.inner.core);
        self.spawn_locked(&mut core);
    }

    fn spawn_locked(&self, core: &mut Core) {
        if matches!(core.phase, Phase::Spawned { .. }) {
            return;
        }
        core.phase = Phase::Spawned {
            stdin: None,
            pid: None,
        };

        let inner = &self.inner;
        if tokio::runtime::Handle::try_current().is_err() {
            inner.close_taps();
            inner.settle(Err(ShellError::NoRuntime));
            return;
        }

        let mut cmd = tokio::process::Command::from(build_command(&inner.command, &core.options));
        log_command_execution(&inner.command, &core.options);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                inner.close_taps();
                inner.settle(Err(launch_error(&inner.command, &core.options, err)));
                return;
            }
        };

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(aggregate(
                stdout,
                OutputStream::Stdout,
                Arc::clone(&inner.output),
                Arc::clone(&inner.stdout_taps),
            )));
        } else {
            inner.stdout_taps.close();
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(aggregate(
                stderr,
                OutputStream::Stderr,
                Arc::clone(&inner.output),
                Arc::clone(&inner.stderr_taps),
            )));
        } else {
            inner.stderr_taps.close();
        }

        let mut stdin = child.stdin.take();
        if let Some(input) = core.options.input.clone()
            && let Some(writer) = stdin.take()
        {
            tokio::spawn(feed_input(writer, input));
        }

        let pid = child.id();
        tracing::debug!(?pid, command = %inner.command.display(), "spawned child");
        core.phase = Phase::Spawned { stdin, pid };
        tokio::spawn(supervise(Arc::clone(inner), child, readers));
    }

    /// Resolve rather than reject on a nonzero exit, and yield the exit
    /// status once the process has exited.
    ///
    /// The tolerance applies from the moment this is called, even if the
    /// returned future is never polled. `None` means the process was killed
    /// by a signal.
    ///
    /// # Errors
    ///
    /// Propagates launch failures.
    pub fn status(&self) -> impl Future<Output = Result<Option<i32>, ShellError>> + Send + 'static {
        self.inner.tolerate_nonzero.store(true, Ordering::Release);
        let handle = self.clone();
        async move {
            match handle.wait().await {
                Ok(output) => Ok(output.status),
                Err(ShellError::ExitStatus { status, .. }) => Ok(Some(status)),
                Err(err) => Err(err),
            }
        }
    }

    /// The child's stdin.
    ///
    /// Before the spawn this forces stdin into pipe mode and starts the
    /// process right away. Yields `None` once the writer has been handed out,
    /// when it feeds configured input, or when the launch failed.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::StdioConfigConflict`] when the process already
    /// started with a stdin mode other than [`StdioMode::Pipe`].
    pub fn stdin(&self) -> Result<Option<ChildStdin>, ShellError> {
        let mut core = lock(&self.inner.core);
        if matches!(core.phase, Phase::Unspawned) {
            let [_, stdout, stderr] = core.options.stdio;
            core.options.stdio = [StdioMode::Pipe, stdout, stderr];
            self.spawn_locked(&mut core);
        }
        let [stdin_mode, _, _] = core.options.stdio_modes();
        if stdin_mode != StdioMode::Pipe {
            return Err(ShellError::StdioConfigConflict {
                mode: stdin_mode.describe(),
            });
        }
        Ok(match &mut core.phase {
            Phase::Spawned { stdin, .. } => stdin.take(),
            Phase::Unspawned => None,
        })
    }

    /// A tap on the child's stdout, spawning the process if needed.
    ///
    /// `None` when stdout is not piped.
    #[must_use]
    pub fn stdout(&self) -> Option<OutputTap> {
        self.tap(OutputStream::Stdout)
    }

    /// A tap on the child's stderr, spawning the process if needed.
    ///
    /// `None` when stderr is not piped.
    #[must_use]
    pub fn stderr(&self) -> Option<OutputTap> {
        self.tap(OutputStream::Stderr)
    }

    fn tap(&self, stream: OutputStream) -> Option<OutputTap> {
        let mut core = lock(&self.inner.core);
        let tap = (stream.mode(core.options.stdio_modes()) == StdioMode::Pipe)
            .then(|| self.inner.taps(stream).subscribe());
        self.spawn_locked(&mut core);
        tap
    }

    /// Connect this handle's stdout to `destination`'s stdin and return
    /// `destination`, so pipes chain: `a.pipe(&b)?.pipe(&c)?`.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::NotPiped`] when this handle's stdout is not
    /// piped, [`ShellError::StdioConfigConflict`] when `destination`
    /// already started without a stdin pipe, [`ShellError::StdinTaken`] when
    /// its stdin writer was already handed out, and the launch error of a
    /// destination that failed to start.
    pub fn pipe(&self, destination: &Self) -> Result<Self, ShellError> {
        let source = self.stdout().ok_or(ShellError::NotPiped {
            stream: OutputStream::Stdout.describe(),
        })?;
        let Some(sink) = destination.stdin()? else {
            if let Some(Err(err)) = destination.inner.settled.borrow().as_ref() {
                return Err(err.clone());
            }
            return Err(ShellError::StdinTaken {
                command: destination.inner.command.display(),
            });
        };
        tokio::spawn(copy_into_stdin(source, sink));
        Ok(destination.clone())
    }

    /// Start `line` through the factory that created this handle and pipe
    /// into it.
    ///
    /// # Errors
    ///
    /// Formatting errors for `line`, plus the errors of [`Self::pipe`].
    pub fn pipe_command(&self, line: &str) -> Result<Self, ShellError> {
        let destination = self.inner.factory.spawn(&Template::literal(line))?;
        self.pipe(&destination)
    }

    /// Copy stdout into `sink`; the returned future resolves once the sink
    /// has been flushed and shut down.
    pub fn pipe_to<W>(&self, sink: W) -> SinkPipe
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        SinkPipe::start(self.stdout(), sink)
    }

    /// Copy stdout into `stage`, whose readable side can be piped further
    /// from the returned [`SinkPipe`].
    pub fn pipe_through<S>(&self, stage: S) -> SinkPipe
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        SinkPipe::start_stage(self.stdout(), stage)
    }

    /// Wait for the handle to settle, spawning the process if needed.
    ///
    /// # Errors
    ///
    /// The rejection the handle settled with.
    pub async fn wait(&self) -> Result<ProcessOutput, ShellError> {
        self.ensure_spawned();
        let mut settled = self.inner.settled.subscribe();
        let result = settled
            .wait_for(Option::is_some)
            .await
            .map(|slot| slot.clone());
        match result {
            Ok(Some(result)) => result,
            Ok(None) | Err(_) => Err(ShellError::io(
                &self.inner.command.command,
                io::Error::other("process handle closed before settling"),
            )),
        }
    }
}

impl IntoFuture for ProcessHandle {
    type Output = Result<ProcessOutput, ShellError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl<'a> IntoFuture for &'a ProcessHandle {
    type Output = Result<ProcessOutput, ShellError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

async fn supervise(inner: Arc<Inner>, mut child: Child, readers: Vec<JoinHandle<()>>) {
    let waited = child.wait().await;
    for reader in readers {
        if let Err(err) = reader.await {
            tracing::warn!("output reader task failed: {err}");
        }
    }
    let result = match waited {
        Ok(exit) => {
            let output = {
                let mut output = lock(&inner.output);
                output.record_exit(exit);
                output.clone()
            };
            let tolerate = inner.tolerate_nonzero.load(Ordering::Acquire);
            check_exit(&output, tolerate).map(|()| output)
        }
        Err(err) => Err(ShellError::io(&inner.command.command, err)),
    };
    inner.settle(result);
}

async fn feed_input(mut stdin: ChildStdin, input: Vec<u8>) {
    match stdin.write_all(&input).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("child closed stdin before consuming all input");
        }
        Err(err) => tracing::warn!("failed to write child input: {err}"),
    }
}

async fn copy_into_stdin(mut source: OutputTap, mut sink: ChildStdin) {
    match tokio::io::copy(&mut source, &mut sink).await {
        Ok(bytes) => tracing::debug!(bytes, "pipe between processes drained"),
        Err(err) => tracing::debug!("pipe between processes closed early: {err}"),
    }
}
