//! Huddle demo client
//!
//! Streams a synthetic video source to a relay and decodes every other
//! participant in the room.
//!
//! ## Usage
//!
//! ```bash
//! export HUDDLE_PEER_ID=1
//! export HUDDLE_URL=ws://127.0.0.1:8080/vs-socket/
//!
//! huddle-client
//!
//! # Legacy single-peer framing, no local preview
//! huddle-client --legacy --no-selfie
//! ```

use std::str::FromStr;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use huddle::testsrc::{start_test_source, LogSink, PassthroughDecoderFactory, PassthroughEncoder, TestSourceConfig};
use huddle::{
    CodecConfig, Framer, PeerId, SendController, SendPolicy, SessionConfig, SessionController,
    WsTransport,
};

/// Client configuration from environment/args
struct Config {
    /// Relay URL, room path included
    url: String,
    /// Our id within the room, assigned by the signaling layer
    peer_id: PeerId,
    /// Remote peer id for --legacy framing
    legacy_peer: Option<PeerId>,
    video: TestSourceConfig,
    selfie: bool,
    watermark: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    fn from_env() -> Result<Self> {
        let url = std::env::var("HUDDLE_URL")
            .unwrap_or_else(|_| format!("ws://127.0.0.1:8080{}", huddle::protocol::DEFAULT_SOCKET_PATH));

        let peer_id = std::env::var("HUDDLE_PEER_ID")
            .context("HUDDLE_PEER_ID environment variable not set")?
            .parse()
            .map(PeerId)
            .context("Invalid HUDDLE_PEER_ID, expected a u32")?;

        let args: Vec<String> = std::env::args().collect();
        let legacy = args.iter().any(|arg| arg == "--legacy");
        let selfie = !args.iter().any(|arg| arg == "--no-selfie");

        let legacy_peer = if legacy {
            Some(PeerId(env_or("HUDDLE_LEGACY_PEER", 0u32)))
        } else {
            None
        };

        Ok(Self {
            url,
            peer_id,
            legacy_peer,
            video: TestSourceConfig {
                width: env_or("HUDDLE_WIDTH", 720),
                height: env_or("HUDDLE_HEIGHT", 480),
                fps: env_or("HUDDLE_FPS", 30),
            },
            selfie,
            watermark: std::env::var("HUDDLE_WATERMARK").ok(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("huddle=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    info!("Huddle client starting");
    info!("  Relay: {}", config.url);
    info!("  Peer id: {}", config.peer_id);
    info!("  Video: {}x{} @ {}fps", config.video.width, config.video.height, config.video.fps);
    info!("  Framing: {}", if config.legacy_peer.is_some() { "legacy" } else { "multiplexed" });

    let transport = WsTransport::connect(&config.url)
        .await
        .context("Failed to connect to relay")?;
    info!("Connected to relay");

    let (capture_rx, _source) = start_test_source(config.video.clone());

    let (chunk_tx, chunk_rx) = mpsc::channel(8);
    let send = SendController::new(
        Box::new(PassthroughEncoder::new(chunk_tx)),
        SendPolicy::default(),
    );

    let framer = match config.legacy_peer {
        Some(peer) => Framer::legacy(peer),
        None => Framer::multiplexed(),
    };

    let session_config = SessionConfig {
        local_peer: config.peer_id,
        codec: CodecConfig {
            width: config.video.width,
            height: config.video.height,
            framerate: config.video.fps,
            ..CodecConfig::default()
        },
        selfie: config.selfie,
        watermark: config.watermark.clone(),
    };

    let mut sink = LogSink::default();
    {
        let (controller, handle) = SessionController::new(
            session_config,
            framer,
            transport,
            send,
            Box::new(PassthroughDecoderFactory),
            capture_rx,
            chunk_rx,
            &mut sink,
        );

        // Log the bandwidth readout as it refreshes
        let mut bandwidth = handle.bandwidth();
        tokio::spawn(async move {
            while bandwidth.changed().await.is_ok() {
                let report = *bandwidth.borrow();
                info!(
                    "Bandwidth: up {:.1} kbps, down {:.1} kbps, {} dropped",
                    report.upload_kbps, report.download_kbps, report.dropped_frames
                );
            }
        });

        let run = controller.run();
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => warn!("Session ended on its own"),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                handle.stop();
                run.await;
            }
        }
    }

    info!("Frames presented: {}", sink.frames_presented);
    Ok(())
}
