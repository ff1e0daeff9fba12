//! Per-peer receive pipeline.
//!
//! Each remote peer gets its own decode session. A session starts with no
//! decoder allocated and discards delta frames until the stream's first
//! keyframe arrives; that keyframe configures the decoder and opens the
//! stream. A decode error releases the decoder and drops the session back to
//! waiting, so the next keyframe rebuilds it from scratch. Nothing a single
//! peer's stream does can disturb any other peer's session.

use tracing::{debug, trace, warn};

use crate::codec::{ChunkKind, CodecConfig, DecodeError, DecoderFactory, EncodedChunk, FrameDecoder};
use crate::frame::{MediaFrame, PeerId};
use crate::sink::DisplaySink;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Discarding deltas until a keyframe arrives.
    AwaitingKeyframe,
    /// Decoder configured; every frame is submitted.
    Streaming,
    /// Torn down; all deliveries ignored.
    Closed,
}

pub struct PeerDecodeSession {
    id: PeerId,
    state: DecodeState,
    decoder: Option<Box<dyn FrameDecoder>>,
    config: CodecConfig,
    epoch: Instant,
    last_timestamp_us: u64,
}

impl PeerDecodeSession {
    pub fn new(id: PeerId, config: CodecConfig) -> Self {
        Self {
            id,
            state: DecodeState::AwaitingKeyframe,
            decoder: None,
            config,
            epoch: Instant::now(),
            last_timestamp_us: 0,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Deliver one demultiplexed frame. Mis-addressed frames are ignored.
    pub fn deliver(
        &mut self,
        frame: MediaFrame,
        decoders: &mut dyn DecoderFactory,
        sink: &mut dyn DisplaySink,
    ) {
        if frame.peer != self.id {
            trace!(peer = %self.id, addressed = %frame.peer, "misrouted frame ignored");
            return;
        }
        if self.state == DecodeState::Closed {
            return;
        }

        if self.decoder.is_none() {
            match decoders.open_decoder(self.id) {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(err) => {
                    warn!(peer = %self.id, %err, "decoder allocation failed");
                    return;
                }
            }
        }

        let awaiting = self.state == DecodeState::AwaitingKeyframe;
        if awaiting && !frame.keyframe {
            trace!(peer = %self.id, "delta discarded while awaiting keyframe");
            return;
        }

        // Take the decoder out so an error path can simply not put it back.
        let mut decoder = match self.decoder.take() {
            Some(d) => d,
            None => return,
        };

        if awaiting {
            if let Err(err) = decoder.configure(&self.config) {
                warn!(peer = %self.id, %err, "decoder configure failed");
                return;
            }
            self.state = DecodeState::Streaming;
            debug!(peer = %self.id, "stream opened at keyframe");
        }

        let timestamp_us = self.next_timestamp();
        let chunk = EncodedChunk {
            kind: if frame.keyframe {
                ChunkKind::Key
            } else {
                ChunkKind::Delta
            },
            timestamp_us,
            data: frame.payload,
        };

        match decoder.decode(chunk) {
            Ok(frames) => {
                self.decoder = Some(decoder);
                for decoded in frames {
                    sink.present(self.id, decoded);
                }
            }
            Err(err) => self.on_decode_error(err),
        }
    }

    /// Wall-clock microseconds since session creation, strictly increasing.
    fn next_timestamp(&mut self) -> u64 {
        let now = self.epoch.elapsed().as_micros() as u64;
        let ts = now.max(self.last_timestamp_us + 1);
        self.last_timestamp_us = ts;
        ts
    }

    fn on_decode_error(&mut self, err: DecodeError) {
        warn!(peer = %self.id, %err, "decode failed, resyncing at next keyframe");
        self.decoder = None;
        self.state = DecodeState::AwaitingKeyframe;
    }

    /// Release the decoder. Idempotent.
    pub fn close(&mut self) {
        if self.state == DecodeState::Closed {
            return;
        }
        self.decoder = None;
        self.state = DecodeState::Closed;
        debug!(peer = %self.id, "decode session closed");
    }
}
