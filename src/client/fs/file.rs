use bytes::{Buf, Bytes, BytesMut};
use std::{
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    task::{ready, Context, Poll, Waker},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf},
    sync::mpsc,
};

use crate::{
    client::error::{Error, SftpResult},
    transport::{ReadHandle, WriteHandle},
};

#[derive(Debug, Default)]
struct Gate {
    paused: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

/// Pauses and resumes a [`ReadStream`] from anywhere, including another
/// task than the one reading.
///
/// While paused no chunk is delivered; a pending read simply waits. The
/// channel stays open and reading continues at the same offset once
/// resumed.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    gate: Arc<Gate>,
}

impl PauseHandle {
    pub fn pause(&self) {
        self.gate.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.gate.paused.store(false, Ordering::SeqCst);

        let waker = self
            .gate
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.gate.paused.load(Ordering::SeqCst)
    }

    /// Returns `true` if the caller has to wait. The waker is registered
    /// before the flag is checked a second time so a concurrent resume is
    /// never missed.
    fn poll_paused(&self, cx: &mut Context<'_>) -> bool {
        if !self.is_paused() {
            return false;
        }

        *self
            .gate
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cx.waker().clone());

        self.is_paused()
    }
}

/// Lazy, finite stream over the contents of a remote file.
///
/// Chunks are pulled either with [`next_chunk`](ReadStream::next_chunk) or
/// through [`AsyncRead`]. The stream cannot be restarted; once the end was
/// reached it keeps reporting it.
pub struct ReadStream {
    path: String,
    inner: ReadHandle,
    chunk_size: usize,
    buffer: BytesMut,
    gate: PauseHandle,
    position: u64,
    ended: bool,
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("path", &self.path)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl ReadStream {
    pub(crate) fn new(path: String, inner: ReadHandle, chunk_size: usize) -> Self {
        Self {
            path,
            inner,
            chunk_size: chunk_size.max(1),
            buffer: BytesMut::new(),
            gate: PauseHandle::default(),
            position: 0,
            ended: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of bytes delivered so far
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    #[must_use]
    pub fn pause_handle(&self) -> PauseHandle {
        self.gate.clone()
    }

    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Waits for the next chunk, `None` once the file is exhausted.
    ///
    /// # Errors
    ///
    /// The transport's read error, annotated with the file path.
    pub async fn next_chunk(&mut self) -> SftpResult<Option<Bytes>> {
        if self.ended {
            return Ok(None);
        }

        // the buffer is taken out so it can be filled while `self` is polled
        let mut chunk = std::mem::take(&mut self.buffer);
        chunk.resize(self.chunk_size, 0);

        let read = std::future::poll_fn(|cx| {
            let mut buf = ReadBuf::new(&mut chunk);
            ready!(self.poll_fill(cx, &mut buf))?;
            Poll::Ready(Ok::<_, io::Error>(buf.filled().len()))
        })
        .await;

        chunk.truncate(*read.as_ref().unwrap_or(&0));
        let data = chunk.split().freeze();
        self.buffer = chunk;

        let len = read.map_err(|e| {
            let err = Error::io("read file", self.path.as_str(), &e);
            error!("{err}");
            err
        })?;

        if len == 0 {
            debug!("read stream for '{}' ended after {} bytes", self.path, self.position);
            return Ok(None);
        }

        trace!("received {len} bytes of '{}'", self.path);
        Ok(Some(data))
    }

    /// Drains the remaining chunks into one buffer.
    ///
    /// # Errors
    ///
    /// The first error reported while reading.
    pub async fn collect(mut self) -> SftpResult<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }

    fn poll_fill(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.ended {
            return Poll::Ready(Ok(()));
        }

        if self.gate.poll_paused(cx) {
            return Poll::Pending;
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;
        let len = buf.filled().len() - before;

        if len == 0 && buf.remaining() > 0 {
            self.ended = true;
        }
        self.position += len as u64;

        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for ReadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let poll = self.poll_fill(cx, buf);
        match poll {
            Poll::Ready(Err(e)) => {
                Poll::Ready(Err(Error::io("read file", self.path.as_str(), &e).into()))
            }
            poll => poll,
        }
    }
}

/// Notifications emitted by a [`WriteStream`].
///
/// A stream emits either `Finish` followed by `Close` after a successful
/// [`close`](WriteStream::close), or `Error` followed by `Close` when it
/// fails or is aborted. `Close` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Error(Error),
    Finish,
    Close,
}

#[derive(Debug)]
enum WriteState {
    Open,
    Closed,
    Failed(Error),
}

/// Buffered sink writing a remote file.
///
/// Data is collected until `high_water_mark` bytes are buffered; further
/// writes then wait until the buffer has been handed to the transport.
/// Completion is only guaranteed after [`close`](WriteStream::close)
/// returned.
pub struct WriteStream {
    path: String,
    inner: Option<WriteHandle>,
    buffer: BytesMut,
    high_water_mark: usize,
    written: u64,
    state: WriteState,
    events: mpsc::UnboundedSender<StreamEvent>,
    receiver: Option<mpsc::UnboundedReceiver<StreamEvent>>,
}

impl std::fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteStream")
            .field("path", &self.path)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

impl WriteStream {
    pub(crate) fn new(path: String, inner: WriteHandle, high_water_mark: usize) -> Self {
        let high_water_mark = high_water_mark.max(1);
        let (events, receiver) = mpsc::unbounded_channel();

        Self {
            path,
            inner: Some(inner),
            buffer: BytesMut::with_capacity(high_water_mark),
            high_water_mark,
            written: 0,
            state: WriteState::Open,
            events,
            receiver: Some(receiver),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes handed to the transport so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes accepted but not yet handed to the transport
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        !matches!(self.state, WriteState::Open)
    }

    /// Takes the receiver of the stream's [`StreamEvent`]s. Only the first
    /// call returns it.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.receiver.take()
    }

    /// Writes the whole chunk, waiting while the buffer is saturated.
    ///
    /// # Errors
    ///
    /// The error the stream failed with.
    pub async fn write_chunk(&mut self, data: &[u8]) -> SftpResult<()> {
        let result = self.write_all(data).await;
        result.map_err(|e| self.annotate("write file", &e))
    }

    /// Flushes everything and closes the remote file.
    ///
    /// # Errors
    ///
    /// The error the stream failed with.
    pub async fn close(&mut self) -> SftpResult<()> {
        let result = self.shutdown().await;
        result.map_err(|e| self.annotate("close file", &e))
    }

    /// Terminates the stream early. `error` is emitted as
    /// [`StreamEvent::Error`] before [`StreamEvent::Close`], buffered data is
    /// discarded and every further write fails with `error`.
    pub fn abort(&mut self, error: Error) {
        if self.is_closed() {
            return;
        }

        warn!("aborting write stream for '{}': {}", self.path, error);
        self.fail(error);
    }

    fn fail(&mut self, error: Error) {
        if self.is_closed() {
            return;
        }

        error!("{error}");
        self.state = WriteState::Failed(error.clone());
        self.inner = None;
        self.buffer.clear();

        let _ = self.events.send(StreamEvent::Error(error));
        let _ = self.events.send(StreamEvent::Close);
    }

    fn annotate(&self, action: &'static str, err: &io::Error) -> Error {
        match &self.state {
            WriteState::Failed(error) => error.clone(),
            _ => Error::io(action, self.path.as_str(), err),
        }
    }

    fn check_open(&self) -> io::Result<()> {
        match &self.state {
            WriteState::Open => Ok(()),
            WriteState::Failed(error) => Err(error.clone().into()),
            WriteState::Closed => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("write stream for '{}' is closed", self.path),
            )),
        }
    }

    /// Hands the buffer to the transport and fails the stream on error.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.buffer.is_empty() {
            let Some(inner) = self.inner.as_mut() else {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            };

            let result = match ready!(Pin::new(inner).poll_write(cx, &self.buffer)) {
                Ok(0) => Err(io::ErrorKind::WriteZero.into()),
                result => result,
            };

            match result {
                Ok(len) => {
                    self.buffer.advance(len);
                    self.written += len as u64;
                }
                Err(e) => return Poll::Ready(Err(self.fail_io("write file", &e))),
            }
        }

        Poll::Ready(Ok(()))
    }

    fn fail_io(&mut self, action: &'static str, err: &io::Error) -> io::Error {
        let error = Error::io(action, self.path.as_str(), err);
        self.fail(error.clone());
        error.into()
    }
}

impl AsyncWrite for WriteStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.check_open()?;

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        if self.buffer.len() >= self.high_water_mark {
            ready!(self.poll_drain(cx))?;
        }

        let len = buf.len().min(self.high_water_mark - self.buffer.len());
        self.buffer.extend_from_slice(&buf[..len]);

        Poll::Ready(Ok(len))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.check_open()?;
        ready!(self.poll_drain(cx))?;

        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        };

        match ready!(Pin::new(inner).poll_flush(cx)) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(self.fail_io("flush file", &e))),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if matches!(self.state, WriteState::Closed) {
            return Poll::Ready(Ok(()));
        }

        ready!(self.as_mut().poll_flush(cx))?;

        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        };

        if let Err(e) = ready!(Pin::new(inner).poll_shutdown(cx)) {
            return Poll::Ready(Err(self.fail_io("close file", &e)));
        }

        debug!("closed write stream for '{}' after {} bytes", self.path, self.written);
        self.state = WriteState::Closed;
        self.inner = None;

        let _ = self.events.send(StreamEvent::Finish);
        let _ = self.events.send(StreamEvent::Close);

        Poll::Ready(Ok(()))
    }
}

impl Drop for WriteStream {
    fn drop(&mut self) {
        if matches!(self.state, WriteState::Open) && !self.buffer.is_empty() {
            warn!(
                "write stream for '{}' dropped with {} unflushed bytes",
                self.path,
                self.buffer.len()
            );
        }
    }
}
