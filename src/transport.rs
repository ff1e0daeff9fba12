//! Relay transport.
//!
//! One full-duplex socket per session carries both JSON control text and
//! binary media. The write side runs a dedicated task draining an unbounded
//! queue; an atomic counter tracks bytes queued but not yet handed to the
//! socket, which is the backlog readout the send policy throttles on.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// What came off the socket.
#[derive(Debug)]
pub enum TransportEvent {
    /// Text message: control JSON or a legacy framing token.
    Control(String),
    /// Binary message: a framed media payload.
    Media(Bytes),
    /// The socket is gone; no more events will follow.
    Closed,
}

/// Session-facing socket interface.
#[allow(async_fn_in_trait)]
pub trait Transport {
    fn is_open(&self) -> bool;
    /// Bytes queued for send but not yet written to the socket.
    fn buffered_bytes(&self) -> usize;
    fn send_media(&mut self, payload: Bytes) -> Result<(), TransportError>;
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn recv(&mut self) -> TransportEvent;
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsTransport<S = MaybeTlsStream<TcpStream>> {
    outbound: mpsc::UnboundedSender<Message>,
    queued: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
    reader: SplitStream<WebSocketStream<S>>,
    _writer: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to a relay URL, e.g. `ws://host:port/vs-socket/`.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, _resp) = connect_async(url).await?;
        debug!(url, "relay socket connected");
        Ok(Self::from_stream(stream))
    }
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already-established WebSocket (server-accepted sockets in
    /// tests take this path).
    pub fn from_stream(stream: WebSocketStream<S>) -> Self {
        let (mut sink, reader) = stream.split();
        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();
        let queued = Arc::new(AtomicUsize::new(0));
        let open = Arc::new(AtomicBool::new(true));

        let writer_queued = Arc::clone(&queued);
        let writer_open = Arc::clone(&open);
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let len = msg.len();
                let res = sink.send(msg).await;
                writer_queued.fetch_sub(len, Ordering::Relaxed);
                if let Err(err) = res {
                    warn!(%err, "relay socket write failed");
                    writer_open.store(false, Ordering::Relaxed);
                    break;
                }
            }
        });

        Self {
            outbound,
            queued,
            open,
            reader,
            _writer: writer,
        }
    }

    fn queue(&self, msg: Message) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        let len = msg.len();
        self.queued.fetch_add(len, Ordering::Relaxed);
        if self.outbound.send(msg).is_err() {
            self.queued.fetch_sub(len, Ordering::Relaxed);
            self.open.store(false, Ordering::Relaxed);
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn buffered_bytes(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    fn send_media(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.queue(Message::Binary(payload.to_vec()))
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.queue(Message::Text(text))
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Control(text),
                Some(Ok(Message::Binary(data))) => return TransportEvent::Media(Bytes::from(data)),
                Some(Ok(Message::Ping(data))) => {
                    // Answer keepalives ourselves; callers never see them.
                    let _ = self.queue(Message::Pong(data));
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::Relaxed);
                    return TransportEvent::Closed;
                }
                Some(Err(err)) => {
                    warn!(%err, "relay socket read failed");
                    self.open.store(false, Ordering::Relaxed);
                    return TransportEvent::Closed;
                }
            }
        }
    }
}
