//! Synthetic media stand-ins.
//!
//! Everything here exists so the pipeline can run end to end with no camera
//! and no codec hardware: a gradient capture source, a passthrough
//! encoder/decoder pair that honors the configure/submit/chunk contract
//! without compressing anything, and a sink that just logs.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, trace};

use crate::codec::{
    ChunkKind, CodecConfig, CodecError, DecodeError, EncodeError, EncodedChunk, FrameDecoder,
    FrameEncoder, RawFrame,
};
use crate::frame::PeerId;
use crate::sink::DisplaySink;

#[derive(Debug, Clone)]
pub struct TestSourceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for TestSourceConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 480,
            fps: 30,
        }
    }
}

/// Spawn a capture source producing a moving RGBA gradient at the configured
/// frame rate. The task ends when the receiver is dropped.
pub fn start_test_source(config: TestSourceConfig) -> (mpsc::Receiver<RawFrame>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(4);
    let handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_micros(1_000_000 / u64::from(config.fps.max(1))));
        let start = tokio::time::Instant::now();
        let mut n: u64 = 0;
        loop {
            ticker.tick().await;
            let frame = gradient_frame(&config, start.elapsed().as_micros() as u64, n);
            n += 1;
            if tx.send(frame).await.is_err() {
                debug!("test source receiver gone, stopping");
                break;
            }
        }
    });
    (rx, handle)
}

fn gradient_frame(config: &TestSourceConfig, timestamp_us: u64, n: u64) -> RawFrame {
    let phase = (n % 256) as u8;
    let mut data = Vec::with_capacity((config.width * config.height * 4) as usize);
    for y in 0..config.height {
        for x in 0..config.width {
            data.push((x as u8).wrapping_add(phase));
            data.push((y as u8).wrapping_add(phase));
            data.push(phase);
            data.push(0xFF);
        }
    }
    RawFrame {
        width: config.width,
        height: config.height,
        timestamp_us,
        data: Bytes::from(data),
    }
}

/// Encoder that forwards raw pixels as chunks. The first chunk (and any
/// explicitly requested one) is marked as a keyframe.
pub struct PassthroughEncoder {
    chunks: mpsc::Sender<EncodedChunk>,
    sent_key: bool,
}

impl PassthroughEncoder {
    pub fn new(chunks: mpsc::Sender<EncodedChunk>) -> Self {
        Self {
            chunks,
            sent_key: false,
        }
    }
}

impl FrameEncoder for PassthroughEncoder {
    fn encode(&mut self, frame: &RawFrame, keyframe: bool) -> Result<(), EncodeError> {
        let key = keyframe || !self.sent_key;
        self.sent_key = true;
        let chunk = EncodedChunk {
            kind: if key { ChunkKind::Key } else { ChunkKind::Delta },
            timestamp_us: frame.timestamp_us,
            data: frame.data.clone(),
        };
        self.chunks.try_send(chunk).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EncodeError::Backend("chunk channel full".into()),
            mpsc::error::TrySendError::Closed(_) => EncodeError::OutputClosed,
        })
    }
}

/// Decoder matching [`PassthroughEncoder`]: hands back one frame per chunk,
/// sized per its configuration.
#[derive(Default)]
pub struct PassthroughDecoder {
    config: Option<CodecConfig>,
}

impl FrameDecoder for PassthroughDecoder {
    fn configure(&mut self, config: &CodecConfig) -> Result<(), CodecError> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<Vec<RawFrame>, DecodeError> {
        let config = self.config.as_ref().ok_or(DecodeError::NotConfigured)?;
        if chunk.data.is_empty() {
            return Err(DecodeError::Corrupt("empty chunk".into()));
        }
        Ok(vec![RawFrame {
            width: config.width,
            height: config.height,
            timestamp_us: chunk.timestamp_us,
            data: chunk.data,
        }])
    }
}

#[derive(Default)]
pub struct PassthroughDecoderFactory;

impl crate::codec::DecoderFactory for PassthroughDecoderFactory {
    fn open_decoder(
        &mut self,
        peer: PeerId,
    ) -> Result<Box<dyn FrameDecoder>, CodecError> {
        debug!(%peer, "passthrough decoder opened");
        Ok(Box::new(PassthroughDecoder::default()))
    }
}

/// Sink that logs instead of rendering.
#[derive(Default)]
pub struct LogSink {
    pub frames_presented: u64,
}

impl DisplaySink for LogSink {
    fn add_surface(&mut self, peer: PeerId) {
        info!(%peer, "surface added");
    }

    fn remove_surface(&mut self, peer: PeerId) {
        info!(%peer, "surface removed");
    }

    fn present(&mut self, peer: PeerId, frame: RawFrame) {
        self.frames_presented += 1;
        trace!(%peer, ts_us = frame.timestamp_us, bytes = frame.data.len(), "frame presented");
    }

    fn present_selfie(&mut self, frame: &RawFrame) {
        trace!(ts_us = frame.timestamp_us, "selfie frame");
    }
}
