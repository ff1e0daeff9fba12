//! Codec service boundary.
//!
//! Compression is an external service: the session core never touches pixels
//! beyond handing them across these traits. Encoders emit chunks on an owned
//! channel (hardware encoders are pipelined and out-of-line with submission);
//! decoders return frames inline, possibly several at once when the codec
//! was buffering.

use bytes::Bytes;
use thiserror::Error;

use crate::frame::PeerId;

/// Stream parameters shared by encoder and decoders. Every participant runs
/// the same configuration in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecConfig {
    /// Codec string, e.g. `"vp8"`.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    pub framerate: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            codec: "vp8".to_string(),
            width: 720,
            height: 480,
            bitrate_bps: 1_000_000,
            framerate: 30,
        }
    }
}

/// Uncompressed RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Key,
    Delta,
}

impl ChunkKind {
    pub fn is_key(self) -> bool {
        matches!(self, ChunkKind::Key)
    }
}

/// One compressed frame out of an encoder or into a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub kind: ChunkKind,
    pub timestamp_us: u64,
    pub data: Bytes,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported codec configuration: {0}")]
    Unsupported(String),
    #[error("codec backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder backend error: {0}")]
    Backend(String),
    /// Nobody is consuming the chunk channel anymore.
    #[error("encoder output channel closed")]
    OutputClosed,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("corrupt bitstream: {0}")]
    Corrupt(String),
    #[error("decoder backend error: {0}")]
    Backend(String),
    #[error("decoder not configured")]
    NotConfigured,
}

/// Compresses raw frames. Output arrives asynchronously on the chunk channel
/// the implementation was built with.
pub trait FrameEncoder: Send {
    /// Submit one frame, optionally requesting a keyframe.
    fn encode(&mut self, frame: &RawFrame, keyframe: bool) -> Result<(), EncodeError>;
}

/// Decompresses one peer's stream. Must be configured before the first
/// decode; reconfiguring at a keyframe boundary is allowed.
pub trait FrameDecoder: Send {
    fn configure(&mut self, config: &CodecConfig) -> Result<(), CodecError>;
    fn decode(&mut self, chunk: EncodedChunk) -> Result<Vec<RawFrame>, DecodeError>;
}

/// Allocates decoders on demand, one per remote peer.
pub trait DecoderFactory: Send {
    fn open_decoder(&mut self, peer: PeerId) -> Result<Box<dyn FrameDecoder>, CodecError>;
}
