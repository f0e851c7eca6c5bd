//! Output aggregation and taps for a running child.

use std::{
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadBuf};

use super::lock;
use crate::{
    options::StdioMode,
    output::ProcessOutput,
};

const PIPE_CHUNK_SIZE: usize = 8192;

/// Bytes a tap buffers before the aggregator waits for its reader.
pub(super) const TAP_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub(super) const fn describe(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    pub(super) const fn mode(self, stdio: [StdioMode; 3]) -> StdioMode {
        let [_, stdout, stderr] = stdio;
        match self {
            Self::Stdout => stdout,
            Self::Stderr => stderr,
        }
    }

    fn buffer(self, output: &mut ProcessOutput) -> &mut Vec<u8> {
        match self {
            Self::Stdout => &mut output.stdout,
            Self::Stderr => &mut output.stderr,
        }
    }
}

/// A readable copy of a child's stdout or stderr.
///
/// Receives every chunk read after the tap was created and reaches end of
/// file when the child closes the stream. A tap that is held but never read
/// stalls the child once its buffer fills; dropping it detaches it.
#[derive(Debug)]
pub struct OutputTap(DuplexStream);

impl AsyncRead for OutputTap {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

#[derive(Default)]
struct TapState {
    writers: Vec<DuplexStream>,
    closed: bool,
}

/// Writers feeding the taps of one stream.
#[derive(Default)]
pub(super) struct TapSet {
    state: Mutex<TapState>,
}

impl TapSet {
    pub(super) fn subscribe(&self) -> OutputTap {
        let (reader, writer) = tokio::io::duplex(TAP_BUFFER_BYTES);
        let mut state = lock(&self.state);
        if !state.closed {
            state.writers.push(writer);
        }
        OutputTap(reader)
    }

    /// Stop feeding taps; their readers see end of file.
    pub(super) fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.writers.clear();
    }

    fn take(&self) -> Vec<DuplexStream> {
        std::mem::take(&mut lock(&self.state).writers)
    }

    fn restore(&self, mut live: Vec<DuplexStream>) {
        let mut state = lock(&self.state);
        live.append(&mut state.writers);
        state.writers = live;
    }
}

/// Read `pipe` to the end, appending every chunk to `output` and forwarding
/// it to the stream's taps in arrival order.
pub(super) async fn aggregate<R>(
    mut pipe: R,
    stream: OutputStream,
    output: Arc<Mutex<ProcessOutput>>,
    taps: Arc<TapSet>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0_u8; PIPE_CHUNK_SIZE];
    loop {
        let read = match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                tracing::warn!(stream = stream.describe(), "failed to read child output: {err}");
                break;
            }
        };
        let Some(bytes) = chunk.get(..read) else {
            break;
        };
        stream.buffer(&mut lock(&output)).extend_from_slice(bytes);
        forward(bytes, stream, &taps).await;
    }
    taps.close();
}

async fn forward(bytes: &[u8], stream: OutputStream, taps: &TapSet) {
    let writers = taps.take();
    if writers.is_empty() {
        return;
    }
    let mut live = Vec::with_capacity(writers.len());
    for mut writer in writers {
        match writer.write_all(bytes).await {
            Ok(()) => live.push(writer),
            Err(err) => {
                tracing::debug!(stream = stream.describe(), "detaching output tap: {err}");
            }
        }
    }
    taps.restore(live);
}
