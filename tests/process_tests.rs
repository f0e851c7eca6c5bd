//! Behaviour of deferred process handles and pipes.
#![cfg(unix)]

use std::{
    io,
    pin::Pin,
    task::{Context as TaskContext, Poll},
    time::Duration,
};

use anyhow::{Context, Result, bail, ensure};
use rstest::{fixture, rstest};
use shex::{ProcessHandle, Shell, ShellError, ShellOptions, StdioMode, cmd};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

#[fixture]
fn shell() -> Shell {
    Shell::default()
}

fn line(shell: &Shell, text: &str) -> Result<ProcessHandle> {
    Ok(shell.spawn_line(text)?)
}

#[rstest]
#[tokio::test]
async fn awaiting_yields_captured_output(shell: Shell) -> Result<()> {
    let handle = shell.spawn(&cmd!("echo {}; echo {} >&2", "out put", "err")?)?;
    ensure!(!handle.is_spawned(), "spawn must wait for the next tick");
    let output = handle.await?;
    ensure!(output.stdout_text() == "out put\n");
    ensure!(output.stderr_text() == "err\n");
    ensure!(output.status == Some(0));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn every_clone_sees_the_same_settlement(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo once")?;
    let clone = handle.clone();
    let (first, second) = tokio::join!(handle.wait(), clone.wait());
    let third = (&handle).await;
    ensure!(first? == second?);
    ensure!(third?.stdout_text() == "once\n");
    ensure!(handle.is_settled() && clone.pid() == handle.pid());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn concurrent_accessors_observe_one_settlement(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo out; echo err >&2; exit 2")?;
    let status = handle.status();
    let mut out_tap = handle.stdout().context("stdout is piped")?;
    let mut err_tap = handle.stderr().context("stderr is piped")?;
    let (out, err, status, waited, awaited) = tokio::join!(
        async {
            let mut text = String::new();
            out_tap.read_to_string(&mut text).await.map(|_| text)
        },
        async {
            let mut text = String::new();
            err_tap.read_to_string(&mut text).await.map(|_| text)
        },
        status,
        handle.wait(),
        async { (&handle).await },
    );
    let (out, err) = (out?, err?);
    ensure!(out == "out\n" && err == "err\n", "taps saw {out:?} / {err:?}");
    ensure!(status? == Some(2));
    let (waited, awaited) = (waited?, awaited?);
    ensure!(waited == awaited, "awaits disagree: {waited:?} vs {awaited:?}");
    ensure!(waited.status == Some(2));
    ensure!(waited.stdout_text() == out && waited.stderr_text() == err);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn nonzero_exit_rejects_with_stderr(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo partial; echo broken >&2; exit 3")?;
    match (&handle).await {
        Err(ShellError::ExitStatus { status, stderr }) => {
            ensure!(status == 3);
            ensure!(stderr == "broken");
        }
        other => bail!("expected exit status failure, got {other:?}"),
    }
    ensure!(handle.output_snapshot().stdout_text() == "partial\n");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn status_tolerates_nonzero_exit(shell: Shell) -> Result<()> {
    let handle = line(&shell, "exit 7")?;
    ensure!(handle.status().await? == Some(7));
    ensure!(handle.await?.status == Some(7));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn signal_deaths_resolve_without_status(shell: Shell) -> Result<()> {
    let output = line(&shell, "kill -TERM $$")?.await?;
    ensure!(output.status.is_none());
    ensure!(output.signal.as_deref() == Some("SIGTERM"), "{output:?}");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn stdin_can_be_requested_in_the_same_tick(shell: Shell) -> Result<()> {
    let handle = line(&shell, "tr a-z A-Z")?;
    let mut stdin = handle.stdin()?.context("stdin should be piped")?;
    ensure!(handle.is_spawned());
    stdin.write_all(b"shout").await?;
    drop(stdin);
    ensure!(handle.stdin()?.is_none(), "the writer is handed out once");
    ensure!(handle.await?.stdout_text() == "SHOUT");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn stdin_after_spawn_conflicts(shell: Shell) -> Result<()> {
    let handle = line(&shell, "true")?;
    (&handle).await?;
    match handle.stdin() {
        Err(ShellError::StdioConfigConflict { mode }) => ensure!(mode == "inherit"),
        other => bail!("expected stdio conflict, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn configured_input_is_fed_to_stdin() -> Result<()> {
    let shell = Shell::new(ShellOptions::new().input("fed\n"));
    let handle = shell.spawn_line("cat")?;
    ensure!(handle.stdin()?.is_none(), "input owns stdin");
    ensure!(handle.await?.stdout_text() == "fed\n");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn taps_see_the_same_bytes_as_the_aggregate(shell: Shell) -> Result<()> {
    let handle = line(&shell, "printf 'one\\ntwo\\n'")?;
    let mut tap = handle.stdout().context("stdout should be piped")?;
    let mut seen = String::new();
    let (read, output) = tokio::join!(tap.read_to_string(&mut seen), handle.wait());
    read?;
    ensure!(seen == "one\ntwo\n");
    ensure!(output?.stdout_text() == seen);
    Ok(())
}

#[tokio::test]
async fn ignored_streams_have_no_tap() -> Result<()> {
    let shell = Shell::new(ShellOptions::new().stdio_all(StdioMode::Ignore));
    let handle = shell.spawn_line("echo hidden")?;
    ensure!(handle.stdout().is_none() && handle.stderr().is_none());
    let output = handle.await?;
    ensure!(output.stdout.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn pipe_returns_the_destination(shell: Shell) -> Result<()> {
    let source = line(&shell, "printf 'b\\na\\nc\\n'")?;
    let sort = line(&shell, "sort")?;
    let piped = source.pipe(&sort)?;
    let sorted = piped.await?;
    ensure!(sorted.stdout_text() == "a\nb\nc\n");
    ensure!(sort.is_settled(), "pipe hands back the destination itself");
    ensure!(source.await?.stdout_text() == "b\na\nc\n");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn pipes_chain_through_command_lines(shell: Shell) -> Result<()> {
    let counted = line(&shell, "printf 'x\\ny\\nx\\n'")?
        .pipe_command("grep x")?
        .pipe_command("wc -l")?
        .await?;
    ensure!(counted.stdout_text().trim() == "2");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn second_pipe_into_the_same_stdin_is_rejected(shell: Shell) -> Result<()> {
    let first = line(&shell, "echo from_a")?;
    let second = line(&shell, "echo from_b")?;
    let cat = line(&shell, "cat")?;
    first.pipe(&cat)?;
    match second.pipe(&cat) {
        Err(ShellError::StdinTaken { command }) => ensure!(command.contains("cat")),
        other => bail!("expected stdin to be taken, got {other:?}"),
    }
    ensure!(cat.await?.stdout_text() == "from_a\n");
    Ok(())
}

#[tokio::test]
async fn piping_into_a_failed_launch_reports_the_launch_error() -> Result<()> {
    let shell = Shell::new(ShellOptions::new().shell(shex::ShellSetting::Disabled));
    let source = shell.spawn_line("echo lost")?;
    let missing = shell.spawn_line("shex-definitely-missing-program")?;
    ensure!(matches!(source.pipe(&missing), Err(ShellError::Launch { .. })));
    ensure!(matches!(missing.wait().await, Err(ShellError::Launch { .. })));
    Ok(())
}

#[tokio::test]
async fn piping_an_unpiped_stream_fails() -> Result<()> {
    let shell = Shell::new(ShellOptions::new().stdio([
        StdioMode::Inherit,
        StdioMode::Ignore,
        StdioMode::Pipe,
    ]));
    let source = shell.spawn_line("true")?;
    let sink = shell.spawn_line("cat")?;
    ensure!(matches!(source.pipe(&sink), Err(ShellError::NotPiped { .. })));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn pipe_to_resolves_once_the_sink_is_done(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo into sink")?;
    let (sink, mut check) = tokio::io::duplex(1024);
    handle.pipe_to(sink).await?;
    let mut seen = String::new();
    check.read_to_string(&mut seen).await?;
    ensure!(seen == "into sink\n");
    Ok(())
}

struct BrokenSink;

impl AsyncWrite for BrokenSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::other("disk full")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[rstest]
#[tokio::test]
async fn pipe_to_rejects_when_the_sink_fails(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo lost")?;
    match handle.pipe_to(BrokenSink).await {
        Err(ShellError::Pipe { source, .. }) => ensure!(source.to_string() == "disk full"),
        other => bail!("expected pipe failure, got {other:?}"),
    }
    Ok(())
}

/// A stage that upper-cases everything written to it.
fn upper_case_stage() -> DuplexStream {
    let (stage, mut inner) = tokio::io::duplex(1024);
    tokio::spawn(async move {
        let mut buf = [0_u8; 256];
        loop {
            let read = match inner.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(read) => read,
            };
            let Some(chunk) = buf.get(..read) else { break };
            if inner.write_all(&chunk.to_ascii_uppercase()).await.is_err() {
                break;
            }
        }
    });
    stage
}

#[rstest]
#[tokio::test]
async fn stages_keep_piping(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo staged")?;
    let (sink, mut check) = tokio::io::duplex(1024);
    handle
        .pipe_through(upper_case_stage())
        .pipe_to(sink)
        .await?;
    let mut seen = String::new();
    check.read_to_string(&mut seen).await?;
    ensure!(seen == "STAGED\n");
    Ok(())
}

/// A stage that refuses writes and never produces output.
struct StuckStage;

impl AsyncRead for StuckStage {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for StuckStage {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::other("stage closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[rstest]
#[tokio::test]
async fn chained_pipes_reject_when_an_upstream_stage_fails(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo stuck")?;
    let (sink, _check) = tokio::io::duplex(1024);
    let chained = handle.pipe_through(StuckStage).pipe_to(sink);
    match tokio::time::timeout(Duration::from_secs(5), chained).await {
        Ok(Err(ShellError::Pipe { source, .. })) => ensure!(source.to_string() == "stage closed"),
        Ok(other) => bail!("expected pipe failure, got {other:?}"),
        Err(_) => bail!("chained pipe hung after its upstream failed"),
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn write_only_sinks_cannot_pipe_onwards(shell: Shell) -> Result<()> {
    let handle = line(&shell, "echo end")?;
    let (first, _keep_first) = tokio::io::duplex(1024);
    let (second, _keep_second) = tokio::io::duplex(1024);
    let result = handle.pipe_to(first).pipe_to(second).await;
    ensure!(matches!(result, Err(ShellError::SinkNotReadable)));
    Ok(())
}

#[tokio::test]
async fn missing_cwd_is_reported() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let missing = camino::Utf8PathBuf::from_path_buf(temp.path().join("gone"))
        .map_err(|path| anyhow::anyhow!("non UTF-8 temp path {}", path.display()))?;
    let shell = Shell::new(ShellOptions::new().cwd(missing.clone()));
    let result = shell.spawn_line("true")?.await;
    match result {
        Err(err @ ShellError::Launch { .. }) => {
            ensure!(
                err.to_string().ends_with(&format!("cwd: {missing}")),
                "unexpected message: {err}"
            );
        }
        other => bail!("expected launch failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_programs_reject_without_cwd_note() -> Result<()> {
    let shell = Shell::new(ShellOptions::new().shell(shex::ShellSetting::Disabled));
    let handle = shell.spawn(&cmd!("shex-definitely-missing-program {}", "arg")?)?;
    ensure!(handle.stdout().is_some(), "taps are handed out even if launch fails");
    match handle.await {
        Err(ShellError::Launch {
            command,
            missing_cwd,
            ..
        }) => {
            ensure!(command == "shex-definitely-missing-program");
            ensure!(missing_cwd.is_none());
        }
        other => bail!("expected launch failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn handles_created_outside_a_runtime_spawn_on_first_await() -> Result<()> {
    let handle = Shell::default().spawn_line("echo later")?;
    ensure!(!handle.is_spawned());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(async { (&handle).await })?;
    ensure!(output.stdout_text() == "later\n");
    Ok(())
}

#[test]
fn accessors_outside_a_runtime_settle_with_an_error() -> Result<()> {
    let handle = Shell::default().spawn_line("echo never")?;
    ensure!(handle.stdout().is_some());
    ensure!(handle.is_settled());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(handle.wait());
    ensure!(matches!(result, Err(ShellError::NoRuntime)));
    Ok(())
}
