//! Response transports.
//!
//! The dispatcher never builds a whole response value. It emits a head
//! (status plus headers) once, then zero or more body chunks, through a
//! [`Transport`]. Throttled routes depend on this: each chunk leaves as soon
//! as its send time arrives.
//!
//! Two transports ship with the crate:
//!
//! - [`Captured`] collects everything in memory. Mock requests and CLI
//!   emulation use it.
//! - `Channel` feeds a hyper response body through a bounded tokio channel.
//!   The server uses it; the receiving end is [`ChannelBody`].

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{self, Poll};

use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame};
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

/// Reports whether the client has gone away.
pub type Probe = Arc<dyn Fn() -> bool + Send + Sync>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values the framework itself emits.
pub enum ContentType {
    Html, // text/html; charset=utf-8
    Json, // application/json
    Text, // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Where a response goes.
///
/// `head` is called exactly once per response, before any `chunk`.
pub trait Transport: Send {
    fn head(
        &mut self,
        status: u16,
        headers: Vec<(String, String)>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn chunk(&mut self, data: Bytes) -> impl Future<Output = Result<(), Error>> + Send;

    /// Disconnect probe handed to handlers; the default never reports one.
    fn probe(&self) -> Probe {
        Arc::new(|| false)
    }
}

// ── Captured ──────────────────────────────────────────────────────────────────

/// In-memory transport.
#[derive(Debug, Default)]
pub struct Captured {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: BytesMut,
    /// Number of body chunks written.
    pub chunks: usize,
}

impl Captured {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for Captured {
    async fn head(&mut self, status: u16, headers: Vec<(String, String)>) -> Result<(), Error> {
        self.status = status;
        self.headers = headers;
        Ok(())
    }

    async fn chunk(&mut self, data: Bytes) -> Result<(), Error> {
        self.body.extend_from_slice(&data);
        self.chunks += 1;
        Ok(())
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// Head of a response, as delivered to the connection task.
pub(crate) type Head = (u16, Vec<(String, String)>);

/// Transport bridging a dispatch task to a hyper connection.
pub(crate) struct Channel {
    head: Option<oneshot::Sender<Head>>,
    body: mpsc::Sender<Bytes>,
}

impl Channel {
    /// The transport plus the receiving ends for the connection task.
    pub(crate) fn new() -> (Self, oneshot::Receiver<Head>, ChannelBody) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(16);
        (Self { head: Some(head_tx), body: body_tx }, head_rx, ChannelBody(body_rx))
    }
}

fn disconnected() -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client disconnected"))
}

impl Transport for Channel {
    async fn head(&mut self, status: u16, headers: Vec<(String, String)>) -> Result<(), Error> {
        self.head
            .take()
            .ok_or_else(|| Error::Fatal("response head sent twice".to_owned()))?
            .send((status, headers))
            .map_err(|_| disconnected())
    }

    async fn chunk(&mut self, data: Bytes) -> Result<(), Error> {
        self.body.send(data).await.map_err(|_| disconnected())
    }

    fn probe(&self) -> Probe {
        let body = self.body.clone();
        Arc::new(move || body.is_closed())
    }
}

/// Streaming response body fed by a [`Channel`]. Ends when the dispatch
/// task drops its sender.
pub struct ChannelBody(mpsc::Receiver<Bytes>);

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.0.poll_recv(cx).map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn channel_streams_head_then_chunks() {
        let (mut tx, head, body) = Channel::new();
        let task = tokio::spawn(async move {
            tx.head(200, vec![("X-A".into(), "1".into())]).await.unwrap();
            tx.chunk(Bytes::from_static(b"he")).await.unwrap();
            tx.chunk(Bytes::from_static(b"llo")).await.unwrap();
        });
        let (status, headers) = head.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(headers[0].1, "1");
        let collected = body.collect().await.unwrap().to_bytes();
        task.await.unwrap();
        assert_eq!(&collected[..], b"hello");
    }

    #[tokio::test]
    async fn probe_sees_dropped_body() {
        let (mut tx, _head, body) = Channel::new();
        let probe = tx.probe();
        assert!(!probe());
        drop(body);
        assert!(probe());
        assert!(tx.chunk(Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn captured_counts_chunks() {
        let mut cap = Captured::new();
        cap.head(404, Vec::new()).await.unwrap();
        cap.chunk(Bytes::from_static(b"a")).await.unwrap();
        cap.chunk(Bytes::from_static(b"b")).await.unwrap();
        assert_eq!(cap.status, 404);
        assert_eq!(&cap.body[..], b"ab");
        assert_eq!(cap.chunks, 2);
    }
}
