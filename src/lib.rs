//! Huddle - multi-party video relay client
//!
//! Captures local video, encodes it, frames it, and pushes it to a dumb relay
//! over a single full-duplex connection, while demultiplexing, decoding, and
//! displaying every other participant's stream coming back. Under constrained
//! networks the client degrades by dropping whole outbound frames instead of
//! accumulating latency, and recovers decoder state at keyframe boundaries.
//!
//! The protocol core:
//!
//! - [`frame`]: the 5-byte wire envelope, plus the legacy single-peer profile
//! - [`control`]: JSON membership messages from the relay
//! - [`session`]: per-peer decode state machines, the peer registry, the
//!   adaptive send controller, and the orchestrating event loop
//! - [`bandwidth`]: 1-second throughput and drop reporting
//! - [`transport`]: the relayed WebSocket with outbound backlog accounting
//!
//! Compression and display are external services behind the traits in
//! [`codec`] and [`sink`]. The `test-source` feature (default) provides
//! synthetic stand-ins for development and tests.

pub mod bandwidth;
pub mod codec;
pub mod control;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transport;

#[cfg(feature = "test-source")]
pub mod testsrc;

pub use bandwidth::{BandwidthReport, BandwidthSampler};
pub use codec::{
    ChunkKind, CodecConfig, CodecError, DecodeError, DecoderFactory, EncodeError, EncodedChunk,
    FrameDecoder, FrameEncoder, RawFrame,
};
pub use control::ControlMessage;
pub use frame::{Framer, MediaFrame, ParseError, PeerId};
pub use session::{
    DecodeState, EncodeErrorPolicy, PeerDecodeSession, PeerRegistry, SendController, SendOutcome,
    SendPolicy, SendState, SessionConfig, SessionController, SessionHandle,
};
pub use sink::{DisplaySink, Watermark};
pub use transport::{Transport, TransportError, TransportEvent, WsTransport};
