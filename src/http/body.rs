//! Request body wrapper that reports when the upload has finished.
//!
//! The response timeout covers only the wait for the upstream's response
//! head, so the forwarder needs to know when the client's body has been
//! handed to the upstream connection in full.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::{Body, Bytes};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tokio::sync::oneshot;

/// Resolves once the tracked body has ended or been dropped.
pub type BodySent = oneshot::Receiver<()>;

/// A streaming request body that signals its end.
#[derive(Debug)]
pub struct TrackedBody {
    inner: Body,
    done: Option<oneshot::Sender<()>>,
}

impl TrackedBody {
    /// Wrap `body`. An empty body counts as sent immediately.
    pub fn new(body: Body) -> (Self, BodySent) {
        let (tx, rx) = oneshot::channel();
        let mut tracked = Self {
            inner: body,
            done: Some(tx),
        };
        if tracked.inner.is_end_stream() {
            tracked.finish();
        }
        (tracked, rx)
    }

    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if frame.is_none() || this.inner.is_end_stream() {
            this.finish();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        // The connection drops the body once it stops writing it.
        self.finish();
    }
}
