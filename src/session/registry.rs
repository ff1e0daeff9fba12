//! Room membership.
//!
//! The registry maps peer ids to decode sessions and is mutated only by
//! control events from the relay. A connect also requests a keyframe from
//! the local encoder: the newcomer can't decode us until a sync point goes
//! out, so the receive side deliberately reaches into the send side here.

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use crate::codec::{CodecConfig, DecoderFactory};
use crate::frame::{MediaFrame, PeerId};
use crate::session::peer::PeerDecodeSession;
use crate::session::send::SendState;
use crate::sink::DisplaySink;

pub struct PeerRegistry {
    sessions: HashMap<PeerId, PeerDecodeSession>,
    config: CodecConfig,
}

impl PeerRegistry {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, id: &PeerId) -> Option<&PeerDecodeSession> {
        self.sessions.get(id)
    }

    /// A peer joined: open a fresh decode session, give it a surface, and
    /// request a keyframe so the newcomer can sync to our stream.
    pub fn on_connect(&mut self, id: PeerId, send: &mut SendState, sink: &mut dyn DisplaySink) {
        if let Some(mut old) = self.sessions.remove(&id) {
            warn!(peer = %id, "duplicate connect, replacing existing session");
            old.close();
        } else {
            sink.add_surface(id);
        }
        self.sessions
            .insert(id, PeerDecodeSession::new(id, self.config.clone()));
        send.force_keyframe = true;
        info!(peer = %id, peers = self.sessions.len(), "peer connected");
    }

    /// A peer left: tear down its session and surface. Unknown ids are a
    /// no-op (the relay may echo disconnects we already processed).
    pub fn on_disconnect(&mut self, id: PeerId, sink: &mut dyn DisplaySink) {
        match self.sessions.remove(&id) {
            Some(mut session) => {
                session.close();
                sink.remove_surface(id);
                info!(peer = %id, peers = self.sessions.len(), "peer disconnected");
            }
            None => debug!(peer = %id, "disconnect for unknown peer ignored"),
        }
    }

    /// Route a demultiplexed frame to its session. Returns false when no
    /// session exists for the addressed peer (frame silently discarded).
    pub fn deliver(
        &mut self,
        frame: MediaFrame,
        decoders: &mut dyn DecoderFactory,
        sink: &mut dyn DisplaySink,
    ) -> bool {
        match self.sessions.get_mut(&frame.peer) {
            Some(session) => {
                session.deliver(frame, decoders, sink);
                true
            }
            None => {
                trace!(peer = %frame.peer, "frame for unregistered peer discarded");
                false
            }
        }
    }
}
