//! Stream wrappers that let a transfer be observed and force-closed.
//!
//! The store moves bytes through a [`Tracked`] reader or writer. The wrapper
//! counts every byte into a shared [`PositionProbe`] that the progress sampler
//! reads, and refuses further I/O once its [`StreamGate`] is closed.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared, monotonically increasing byte position of a transfer
#[derive(Debug, Clone, Default)]
pub struct PositionProbe(Arc<AtomicU64>);

impl PositionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes moved so far
    pub fn position(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn advance(&self, n: usize) {
        self.0.fetch_add(n as u64, Ordering::AcqRel);
    }
}

/// Close switch for an active transfer stream
#[derive(Debug, Clone, Default)]
pub struct StreamGate(Arc<AtomicBool>);

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every further read or write on the guarded stream fail
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> io::Result<()> {
        if self.is_closed() {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "transfer stream closed"))
        } else {
            Ok(())
        }
    }
}

/// Reader or writer whose traffic is counted and which can be force-closed
#[pin_project]
#[derive(Debug)]
pub struct Tracked<S> {
    #[pin]
    inner: S,
    probe: PositionProbe,
    gate: StreamGate,
}

impl<S> Tracked<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            probe: PositionProbe::new(),
            gate: StreamGate::new(),
        }
    }

    pub fn probe(&self) -> PositionProbe {
        self.probe.clone()
    }

    pub fn gate(&self) -> StreamGate {
        self.gate.clone()
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead> AsyncRead for Tracked<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        this.gate.check()?;

        let before = buf.filled().len();
        let poll = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.probe.advance(buf.filled().len() - before);
        }
        poll
    }
}

impl<S: AsyncWrite> AsyncWrite for Tracked<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        this.gate.check()?;

        let poll = this.inner.poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.probe.advance(*n);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        this.gate.check()?;
        this.inner.poll_flush(cx)
    }

    // Shutdown stays allowed on a closed gate so owned streams can always be released.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
