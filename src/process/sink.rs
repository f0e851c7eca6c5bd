//! Future wrapper for output piped into an arbitrary writer.

use std::{
    fmt,
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
};

use super::OutputTap;
use crate::error::ShellError;

type Readable = Box<dyn AsyncRead + Send + Unpin>;

enum Completion {
    Running(JoinHandle<Result<(), ShellError>>),
    Failed(ShellError),
}

impl Future for Completion {
    type Output = Result<(), ShellError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            Self::Running(task) => Pin::new(task).poll(cx).map(|joined| {
                joined.unwrap_or_else(|err| Err(ShellError::pipe("sink", io::Error::other(err))))
            }),
            Self::Failed(err) => Poll::Ready(Err(err.clone())),
        }
    }
}

/// Completion of a copy into a sink, awaitable like a process handle.
///
/// Resolves once everything has been written and the sink has been shut
/// down, and rejects with the first I/O error. Pipes taken from a `SinkPipe`
/// are `SinkPipe`s again and also wait for every upstream copy.
#[must_use = "the copy runs in the background; await the pipe to observe failures"]
pub struct SinkPipe {
    completion: Completion,
    output: Option<Readable>,
}

impl fmt::Debug for SinkPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkPipe")
            .field("readable", &self.output.is_some())
            .finish_non_exhaustive()
    }
}

impl SinkPipe {
    fn failed(err: ShellError) -> Self {
        Self {
            completion: Completion::Failed(err),
            output: None,
        }
    }

    pub(super) fn start<W>(source: Option<OutputTap>, sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let Some(source) = source else {
            return Self::failed(ShellError::NotPiped { stream: "stdout" });
        };
        Self::copy(source, sink, None, None)
    }

    pub(super) fn start_stage<S>(source: Option<OutputTap>, stage: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Some(source) = source else {
            return Self::failed(ShellError::NotPiped { stream: "stdout" });
        };
        let (reader, writer) = tokio::io::split(stage);
        Self::copy(source, writer, None, Some(Box::new(reader)))
    }

    fn copy<R, W>(
        source: R,
        sink: W,
        upstream: Option<Completion>,
        output: Option<Readable>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        if tokio::runtime::Handle::try_current().is_err() {
            return Self::failed(ShellError::NoRuntime);
        }
        // Upstream failures must surface even while the copy is still
        // waiting on a reader that never closes.
        let task = tokio::spawn(async move {
            let upstream = async move {
                match upstream {
                    Some(upstream) => upstream.await,
                    None => Ok(()),
                }
            };
            tokio::try_join!(copy_and_close(source, sink), upstream).map(|((), ())| ())
        });
        Self {
            completion: Completion::Running(task),
            output,
        }
    }

    /// Copy this pipe's readable side into `sink`.
    ///
    /// The result rejects with [`ShellError::SinkNotReadable`] when this pipe
    /// ends in a write-only sink.
    pub fn pipe_to<W>(self, sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let Self { completion, output } = self;
        match output {
            Some(source) => Self::copy(source, sink, Some(completion), None),
            None => Self::failed(ShellError::SinkNotReadable),
        }
    }

    /// Copy this pipe's readable side through another `stage`.
    pub fn pipe_through<S>(self, stage: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Self { completion, output } = self;
        let Some(source) = output else {
            return Self::failed(ShellError::SinkNotReadable);
        };
        let (reader, writer) = tokio::io::split(stage);
        Self::copy(source, writer, Some(completion), Some(Box::new(reader)))
    }
}

impl Future for SinkPipe {
    type Output = Result<(), ShellError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().completion).poll(cx)
    }
}

async fn copy_and_close<R, W>(mut source: R, mut sink: W) -> Result<(), ShellError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::io::copy(&mut source, &mut sink)
        .await
        .map_err(|err| ShellError::pipe("sink", err))?;
    sink.shutdown()
        .await
        .map_err(|err| ShellError::pipe("sink", err))
}
