//! The session core: per-peer decode state machines, the peer registry, the
//! adaptive send controller, and the event loop that ties them to the
//! transport.

mod controller;
mod peer;
mod registry;
mod send;

pub use controller::{SessionConfig, SessionController, SessionHandle};
pub use peer::{DecodeState, PeerDecodeSession};
pub use registry::PeerRegistry;
pub use send::{EncodeErrorPolicy, SendController, SendOutcome, SendPolicy, SendState};
