//! Relay control plane.
//!
//! The relay announces room membership over the same socket as media, as
//! small JSON text messages. Unknown text is ignored by the caller so the
//! control vocabulary can grow without breaking old clients.

use serde::{Deserialize, Serialize};

use crate::frame::PeerId;

/// A membership event from the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    /// A peer joined the room.
    Connect { id: PeerId },
    /// A peer left the room.
    Disconnect { id: PeerId },
}
