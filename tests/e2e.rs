//! E2E regression suite.
//!
//! Runs a scripted loopback relay on a real WebSocket (no camera, no codec
//! hardware) to exercise the full client pipeline:
//!
//! - relay → transport → framer → registry → decoder → sink (receive side)
//! - capture → send policy → encoder → framer → transport → relay (send side)
//!
//! Run: `cargo test --test e2e`

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use huddle::frame::{decode_frame, encode_frame};
use huddle::testsrc::{PassthroughDecoderFactory, PassthroughEncoder};
use huddle::{
    CodecConfig, DisplaySink, Framer, MediaFrame, PeerId, RawFrame, SendController, SendPolicy,
    SessionConfig, SessionController, WsTransport,
};

// ── Shared helpers ───────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    surfaces: Vec<PeerId>,
    presented: Vec<(PeerId, usize)>,
}

impl DisplaySink for RecordingSink {
    fn add_surface(&mut self, peer: PeerId) {
        self.surfaces.push(peer);
    }
    fn remove_surface(&mut self, peer: PeerId) {
        self.surfaces.retain(|p| *p != peer);
    }
    fn present(&mut self, peer: PeerId, frame: RawFrame) {
        self.presented.push((peer, frame.data.len()));
    }
}

/// Bind a loopback listener and hand the single accepted socket to `script`.
async fn spawn_relay<F, Fut>(script: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}/vs-socket/")
}

/// Read binary messages off the relay side until `n` arrive or the deadline
/// passes.
async fn collect_binary(ws: &mut WebSocketStream<TcpStream>, n: usize) -> Vec<Bytes> {
    let mut out = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while out.len() < n {
        let msg = tokio::time::timeout_at(deadline, ws.next()).await;
        match msg {
            Ok(Some(Ok(Message::Binary(data)))) => out.push(Bytes::from(data)),
            Ok(Some(Ok(_))) => {}
            _ => break,
        }
    }
    out
}

fn wire_frame(peer: u32, keyframe: bool, payload: &'static [u8]) -> Message {
    Message::Binary(
        encode_frame(&MediaFrame {
            peer: PeerId(peer),
            keyframe,
            payload: Bytes::from_static(payload),
        })
        .to_vec(),
    )
}

fn raw_frame(fill: u8) -> RawFrame {
    RawFrame {
        width: 4,
        height: 4,
        timestamp_us: 0,
        data: Bytes::from(vec![fill; 64]),
    }
}

struct Client<'s> {
    controller: SessionController<'s, WsTransport>,
    handle: huddle::SessionHandle,
    capture_tx: mpsc::Sender<RawFrame>,
}

async fn connect_client<'s>(
    url: &str,
    framer: Framer,
    sink: &'s mut RecordingSink,
) -> Client<'s> {
    let transport = WsTransport::connect(url).await.unwrap();
    let (capture_tx, capture_rx) = mpsc::channel(8);
    let (chunk_tx, chunk_rx) = mpsc::channel(8);
    let send = SendController::new(
        Box::new(PassthroughEncoder::new(chunk_tx)),
        SendPolicy::default(),
    );
    let config = SessionConfig {
        local_peer: PeerId(1),
        codec: CodecConfig {
            width: 4,
            height: 4,
            ..CodecConfig::default()
        },
        selfie: false,
        watermark: None,
    };
    let (controller, handle) = SessionController::new(
        config,
        framer,
        transport,
        send,
        Box::new(PassthroughDecoderFactory),
        capture_rx,
        chunk_rx,
        sink,
    );
    Client {
        controller,
        handle,
        capture_tx,
    }
}

/// Run the session until the stopper fires.
async fn run_for(client: Client<'_>, millis: u64) {
    let Client {
        controller, handle, ..
    } = client;
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        handle.stop();
    });
    tokio::time::timeout(Duration::from_secs(5), controller.run())
        .await
        .expect("session did not stop");
    let _ = stopper.await;
}

// ── Receive side ─────────────────────────────────────────────────────

#[tokio::test]
async fn receives_and_decodes_remote_frames() {
    let url = spawn_relay(|mut ws| async move {
        ws.send(Message::Text(r#"{"action":"connect","id":7}"#.into()))
            .await
            .unwrap();
        // Delta before the first keyframe must be discarded.
        ws.send(wire_frame(7, false, b"early-delta")).await.unwrap();
        ws.send(wire_frame(7, true, &[0x01, 0x02])).await.unwrap();
        ws.send(wire_frame(7, false, b"delta")).await.unwrap();
        // Keep the socket open until the client finishes.
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let mut sink = RecordingSink::default();
    let client = connect_client(&url, Framer::multiplexed(), &mut sink).await;
    run_for(client, 300).await;

    assert_eq!(sink.surfaces, vec![PeerId(7)]);
    assert_eq!(sink.presented.len(), 2);
    assert_eq!(sink.presented[0], (PeerId(7), 2));
    assert_eq!(sink.presented[1], (PeerId(7), 5));
}

#[tokio::test]
async fn disconnect_removes_surface() {
    let url = spawn_relay(|mut ws| async move {
        ws.send(Message::Text(r#"{"action":"connect","id":7}"#.into()))
            .await
            .unwrap();
        ws.send(wire_frame(7, true, b"kf")).await.unwrap();
        ws.send(Message::Text(r#"{"action":"disconnect","id":7}"#.into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let mut sink = RecordingSink::default();
    let client = connect_client(&url, Framer::multiplexed(), &mut sink).await;
    run_for(client, 300).await;

    assert!(sink.surfaces.is_empty());
    assert_eq!(sink.presented.len(), 1);
}

// ── Send side ────────────────────────────────────────────────────────

#[tokio::test]
async fn uploads_framed_capture() {
    let (collected_tx, mut collected_rx) = mpsc::channel(1);
    let url = spawn_relay(move |mut ws| async move {
        let frames = collect_binary(&mut ws, 3).await;
        collected_tx.send(frames).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let mut sink = RecordingSink::default();
    let client = connect_client(&url, Framer::multiplexed(), &mut sink).await;
    let capture_tx = client.capture_tx.clone();
    let feeder = tokio::spawn(async move {
        for fill in 0..3u8 {
            capture_tx.send(raw_frame(fill)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });
    run_for(client, 500).await;
    let _ = feeder.await;

    let frames = collected_rx.recv().await.unwrap();
    assert_eq!(frames.len(), 3);
    let first = decode_frame(frames[0].clone()).unwrap();
    assert_eq!(first.peer, PeerId(1));
    assert!(first.keyframe, "first uploaded frame must be a keyframe");
    let second = decode_frame(frames[1].clone()).unwrap();
    assert!(!second.keyframe);
}

// ── Legacy profile ───────────────────────────────────────────────────

#[tokio::test]
async fn legacy_profile_roundtrip() {
    let (collected_tx, mut collected_rx) = mpsc::channel(1);
    let url = spawn_relay(move |mut ws| async move {
        // Membership still arrives as JSON; only the "key" token is framing.
        ws.send(Message::Text(r#"{"action":"connect","id":9}"#.into()))
            .await
            .unwrap();
        // Remote peer announces a keyframe out of band, then sends it bare.
        ws.send(Message::Text("key".into())).await.unwrap();
        ws.send(Message::Binary(b"bare-keyframe".to_vec()))
            .await
            .unwrap();
        ws.send(Message::Binary(b"bare-delta".to_vec()))
            .await
            .unwrap();
        // Collect the client's upload; keyframes arrive as token + payload.
        let mut texts = Vec::new();
        let mut frames = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while frames.len() < 2 {
            match tokio::time::timeout_at(deadline, ws.next()).await {
                Ok(Some(Ok(Message::Text(t)))) => texts.push(t),
                Ok(Some(Ok(Message::Binary(b)))) => frames.push(Bytes::from(b)),
                _ => break,
            }
        }
        collected_tx.send((texts, frames)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    let mut sink = RecordingSink::default();
    let client = connect_client(&url, Framer::legacy(PeerId(9)), &mut sink).await;
    let capture_tx = client.capture_tx.clone();
    let feeder = tokio::spawn(async move {
        for fill in 0..2u8 {
            capture_tx.send(raw_frame(fill)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });
    run_for(client, 500).await;
    let _ = feeder.await;

    let (texts, frames) = collected_rx.recv().await.unwrap();
    // First upload is the forced keyframe: token precedes the bare payload.
    assert!(texts.iter().any(|t| t == "key"));
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].len(), 64, "legacy payload carries no envelope");

    assert_eq!(sink.presented.len(), 2);
    assert_eq!(sink.presented[0], (PeerId(9), 13));
    assert_eq!(sink.presented[1], (PeerId(9), 10));
}
