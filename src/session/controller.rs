//! Session orchestration.
//!
//! One cooperative task owns the transport, the send controller, the peer
//! registry, and the bandwidth sampler, and multiplexes four inputs:
//! captured frames, encoded chunks, transport events, and the sampler tick.
//! State is only ever touched between awaits, so none of it needs locks.
//!
//! Transport loss is not session loss: a dead socket stops sends and
//! bandwidth reports but leaves every peer session (and the capture loop)
//! intact, so a future reconnect resumes where membership left off.

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::bandwidth::{BandwidthReport, BandwidthSampler};
use crate::codec::{CodecConfig, DecoderFactory, EncodedChunk, RawFrame};
use crate::control::ControlMessage;
use crate::frame::{Framer, MediaFrame, ParseError, PeerId};
use crate::protocol::BANDWIDTH_WINDOW;
use crate::session::registry::PeerRegistry;
use crate::session::send::{SendController, SendOutcome};
use crate::sink::{DisplaySink, Watermark};
use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub local_peer: PeerId,
    pub codec: CodecConfig,
    /// Mirror captured frames to the sink before encoding.
    pub selfie: bool,
    /// Optional text label composited onto outbound frames.
    pub watermark: Option<String>,
}

/// Control surface held by the caller while the session runs.
pub struct SessionHandle {
    stop: watch::Sender<bool>,
    bandwidth: watch::Receiver<BandwidthReport>,
}

impl SessionHandle {
    /// Ask the session to finish its current iteration and return.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Once-per-second throughput readout.
    pub fn bandwidth(&self) -> watch::Receiver<BandwidthReport> {
        self.bandwidth.clone()
    }
}

pub struct SessionController<'s, T: Transport> {
    transport: Option<T>,
    framer: Framer,
    registry: PeerRegistry,
    send: SendController,
    sampler: BandwidthSampler,
    sampling: bool,
    decoders: Box<dyn DecoderFactory>,
    sink: &'s mut dyn DisplaySink,
    capture: Option<mpsc::Receiver<RawFrame>>,
    chunks: Option<mpsc::Receiver<EncodedChunk>>,
    stop: watch::Receiver<bool>,
    watermark: Option<Watermark>,
    selfie: bool,
    local_peer: PeerId,
}

/// One loop iteration's input, resolved before any state is touched.
enum Step {
    Captured(Option<RawFrame>),
    Chunk(Option<EncodedChunk>),
    Report(BandwidthReport),
    Event(TransportEvent),
    Stopped,
}

async fn next_msg<M>(rx: &mut Option<mpsc::Receiver<M>>) -> Option<M> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_event<T: Transport>(transport: &mut Option<T>) -> TransportEvent {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

impl<'s, T: Transport> SessionController<'s, T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        framer: Framer,
        transport: T,
        send: SendController,
        decoders: Box<dyn DecoderFactory>,
        capture: mpsc::Receiver<RawFrame>,
        chunks: mpsc::Receiver<EncodedChunk>,
        sink: &'s mut dyn DisplaySink,
    ) -> (Self, SessionHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (sampler, bandwidth) = BandwidthSampler::new(BANDWIDTH_WINDOW);
        let controller = Self {
            transport: Some(transport),
            framer,
            registry: PeerRegistry::new(config.codec),
            send,
            sampler,
            sampling: true,
            decoders,
            sink,
            capture: Some(capture),
            chunks: Some(chunks),
            stop: stop_rx,
            watermark: config.watermark.map(Watermark::new),
            selfie: config.selfie,
            local_peer: config.local_peer,
        };
        let handle = SessionHandle {
            stop: stop_tx,
            bandwidth,
        };
        (controller, handle)
    }

    /// Run until stopped. Peer sessions are torn down on return.
    pub async fn run(mut self) {
        info!(peer = %self.local_peer, "session started");
        loop {
            if *self.stop.borrow() {
                break;
            }
            let step = tokio::select! {
                res = self.stop.changed() => {
                    if res.is_err() {
                        Step::Stopped
                    } else {
                        continue;
                    }
                }
                frame = next_msg(&mut self.capture) => Step::Captured(frame),
                chunk = next_msg(&mut self.chunks) => Step::Chunk(chunk),
                report = self.sampler.tick(), if self.sampling => Step::Report(report),
                event = next_event(&mut self.transport) => Step::Event(event),
            };
            match step {
                Step::Captured(Some(frame)) => self.on_captured(frame),
                Step::Captured(None) => {
                    debug!("capture source ended");
                    self.capture = None;
                }
                Step::Chunk(Some(chunk)) => self.on_chunk(chunk),
                Step::Chunk(None) => {
                    debug!("encoder chunk channel ended");
                    self.chunks = None;
                }
                Step::Report(report) => {
                    trace!(
                        up_kbps = report.upload_kbps,
                        down_kbps = report.download_kbps,
                        dropped = report.dropped_frames,
                        "bandwidth window closed"
                    );
                }
                Step::Event(event) => self.on_transport_event(event),
                Step::Stopped => break,
            }
        }
        info!(peer = %self.local_peer, dropped = self.sampler.dropped_frames(), "session stopped");
    }

    fn on_captured(&mut self, frame: RawFrame) {
        if self.selfie {
            self.sink.present_selfie(&frame);
        }
        let frame = match &self.watermark {
            Some(wm) => wm.apply(frame),
            None => frame,
        };
        let (backlog, open) = match &self.transport {
            Some(t) => (t.buffered_bytes(), t.is_open()),
            None => (0, false),
        };
        match self.send.process_frame(frame, backlog, open) {
            Ok(SendOutcome::Dropped) => self.sampler.record_drop(),
            Ok(_) => {}
            Err(err) => {
                error!(%err, "encoder failed, stopping outbound video");
                self.capture = None;
            }
        }
    }

    fn on_chunk(&mut self, chunk: EncodedChunk) {
        let frame = MediaFrame {
            peer: self.local_peer,
            keyframe: chunk.kind.is_key(),
            payload: chunk.data,
        };
        let (token, wire) = self.framer.encode(&frame);
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        if !transport.is_open() {
            warn!("transport closed, outbound chunk discarded");
            self.sampling = false;
            return;
        }
        let sent = wire.len();
        let result = match token {
            Some(tok) => transport
                .send_text(tok.to_string())
                .and_then(|()| transport.send_media(wire)),
            None => transport.send_media(wire),
        };
        match result {
            Ok(()) => {
                self.sampler.record_upload(sent);
                self.transport = Some(transport);
            }
            Err(err) => {
                error!(%err, "transport send failed");
                self.sampling = false;
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Control(text) => self.on_control(text),
            TransportEvent::Media(data) => {
                self.sampler.record_download(data.len());
                match self.framer.decode(data) {
                    Ok(frame) => {
                        self.registry
                            .deliver(frame, self.decoders.as_mut(), &mut *self.sink);
                    }
                    Err(ParseError::Truncated { len }) => {
                        warn!(len, "truncated media message discarded");
                    }
                }
            }
            TransportEvent::Closed => {
                info!("transport closed; peer sessions stay up");
                self.transport = None;
                self.sampling = false;
            }
        }
    }

    fn on_control(&mut self, text: String) {
        if self.framer.on_text_token(&text) {
            return;
        }
        match serde_json::from_str::<ControlMessage>(&text) {
            Ok(ControlMessage::Connect { id }) => {
                self.registry
                    .on_connect(id, self.send.state_mut(), &mut *self.sink);
            }
            Ok(ControlMessage::Disconnect { id }) => {
                self.registry.on_disconnect(id, &mut *self.sink);
            }
            Err(err) => warn!(%err, text, "unparseable control message ignored"),
        }
    }
}
