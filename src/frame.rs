//! Wire framing for relayed media.
//!
//! The relay is a dumb fan-out: every binary message a client uploads is
//! copied verbatim to every other participant, so the sender has to stamp
//! enough onto each message for receivers to demultiplex. The multiplexed
//! profile prepends a fixed 5-byte envelope:
//!
//! ```text
//! +----------------+-----------+------------------+
//! | peer id (LE)   | keyframe  | encoded payload  |
//! | 4 bytes        | 1 byte    | remaining bytes  |
//! +----------------+-----------+------------------+
//! ```
//!
//! The legacy single-peer profile carries the payload bare and announces
//! keyframes with an out-of-band `"key"` text token immediately before the
//! binary message; it only works when the session has exactly one remote
//! peer, fixed at construction.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{FRAME_HEADER_SIZE, LEGACY_KEY_TOKEN};

/// Identifies one participant within a room. Assigned out of band by the
/// signaling layer; opaque to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One encoded video message as it crosses the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    pub peer: PeerId,
    pub keyframe: bool,
    pub payload: Bytes,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer shorter than the fixed envelope.
    #[error("frame truncated: {len} bytes, need at least {FRAME_HEADER_SIZE}")]
    Truncated { len: usize },
}

/// Encode a frame into its multiplexed wire form.
pub fn encode_frame(frame: &MediaFrame) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
    buf.put_u32_le(frame.peer.0);
    buf.put_u8(u8::from(frame.keyframe));
    buf.put_slice(&frame.payload);
    buf.freeze()
}

/// Decode a multiplexed wire message. Zero-length payloads are accepted;
/// any nonzero flag byte counts as a keyframe.
pub fn decode_frame(mut buf: Bytes) -> Result<MediaFrame, ParseError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Err(ParseError::Truncated { len: buf.len() });
    }
    let peer = PeerId(buf.get_u32_le());
    let keyframe = buf.get_u8() != 0;
    Ok(MediaFrame {
        peer,
        keyframe,
        payload: buf,
    })
}

/// Framing profile, chosen once at session construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framer {
    /// 5-byte envelope on every binary message.
    Multiplexed,
    /// Bare payloads scoped to a single remote peer; keyframes announced by
    /// a text token preceding the binary message.
    Legacy { peer: PeerId, pending_key: bool },
}

impl Framer {
    pub fn multiplexed() -> Self {
        Framer::Multiplexed
    }

    pub fn legacy(peer: PeerId) -> Self {
        Framer::Legacy {
            peer,
            pending_key: false,
        }
    }

    /// Encode an outbound frame. Returns an optional text token to send
    /// first, then the binary message.
    pub fn encode(&self, frame: &MediaFrame) -> (Option<&'static str>, Bytes) {
        match self {
            Framer::Multiplexed => (None, encode_frame(frame)),
            Framer::Legacy { .. } => {
                let token = frame.keyframe.then_some(LEGACY_KEY_TOKEN);
                (token, frame.payload.clone())
            }
        }
    }

    /// Feed an inbound text message. Returns true if the token was consumed
    /// as framing state (and should not be forwarded to the control plane).
    pub fn on_text_token(&mut self, text: &str) -> bool {
        match self {
            Framer::Multiplexed => false,
            Framer::Legacy { pending_key, .. } => {
                if text == LEGACY_KEY_TOKEN {
                    *pending_key = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Decode an inbound binary message into a routed frame.
    pub fn decode(&mut self, buf: Bytes) -> Result<MediaFrame, ParseError> {
        match self {
            Framer::Multiplexed => decode_frame(buf),
            Framer::Legacy { peer, pending_key } => Ok(MediaFrame {
                peer: *peer,
                keyframe: std::mem::take(pending_key),
                payload: buf,
            }),
        }
    }
}
