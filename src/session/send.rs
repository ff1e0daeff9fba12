//! Outbound send policy.
//!
//! Latency beats completeness: when the socket's unsent backlog climbs past
//! the threshold, captured frames are dropped whole before they ever reach
//! the encoder. A keyframe is forced on a fixed cadence and whenever a peer
//! joins; the request survives drops and encoder failures and clears only
//! when a frame actually reaches the encoder with the flag set.

use tracing::{trace, warn};

use crate::codec::{EncodeError, FrameEncoder, RawFrame};
use crate::protocol::{DEFAULT_DROP_THRESHOLD, DEFAULT_KEYFRAME_INTERVAL};

/// What to do when the encoder rejects a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeErrorPolicy {
    /// Propagate the error; the caller stops the send loop.
    Fatal,
    /// Log and keep capturing.
    Continue,
}

#[derive(Debug, Clone)]
pub struct SendPolicy {
    /// Unsent-byte backlog above which frames are dropped.
    pub drop_threshold: usize,
    /// Force a keyframe every this many captured frames.
    pub keyframe_interval: u64,
    pub on_encode_error: EncodeErrorPolicy,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            on_encode_error: EncodeErrorPolicy::Continue,
        }
    }
}

/// Mutable send-side state, shared with the registry so peer joins can
/// request a keyframe.
#[derive(Debug, Default)]
pub struct SendState {
    pub force_keyframe: bool,
    pub frame_counter: u64,
}

/// What became of one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the encoder.
    Submitted { keyframe: bool },
    /// Dropped for backlog; counted against the bandwidth report.
    Dropped,
    /// Released because the transport is closed; not a policy drop.
    Offline,
    /// Encoder rejected it and policy says keep going.
    EncodeFailed,
}

pub struct SendController {
    encoder: Box<dyn FrameEncoder>,
    policy: SendPolicy,
    state: SendState,
}

impl SendController {
    /// The first submitted frame is always a keyframe so anyone already in
    /// the room can sync immediately.
    pub fn new(encoder: Box<dyn FrameEncoder>, policy: SendPolicy) -> Self {
        Self {
            encoder,
            policy,
            state: SendState {
                force_keyframe: true,
                frame_counter: 0,
            },
        }
    }

    pub fn state(&self) -> &SendState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SendState {
        &mut self.state
    }

    pub fn request_keyframe(&mut self) {
        self.state.force_keyframe = true;
    }

    /// Run one captured frame through the policy. `backlog` is the
    /// transport's queued-but-unsent byte count.
    pub fn process_frame(
        &mut self,
        frame: RawFrame,
        backlog: usize,
        transport_open: bool,
    ) -> Result<SendOutcome, EncodeError> {
        self.state.frame_counter += 1;
        if self.state.frame_counter % self.policy.keyframe_interval == 0 {
            self.state.force_keyframe = true;
        }

        if backlog > self.policy.drop_threshold {
            trace!(backlog, threshold = self.policy.drop_threshold, "frame dropped for backlog");
            return Ok(SendOutcome::Dropped);
        }
        if !transport_open {
            return Ok(SendOutcome::Offline);
        }

        let keyframe = self.state.force_keyframe;
        match self.encoder.encode(&frame, keyframe) {
            Ok(()) => {
                self.state.force_keyframe = false;
                Ok(SendOutcome::Submitted { keyframe })
            }
            Err(err) => match self.policy.on_encode_error {
                EncodeErrorPolicy::Fatal => Err(err),
                EncodeErrorPolicy::Continue => {
                    warn!(%err, "encode failed, continuing");
                    Ok(SendOutcome::EncodeFailed)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;

    #[derive(Default)]
    struct EncodeLog {
        submissions: Vec<bool>,
        fail_next: bool,
    }

    struct FakeEncoder {
        log: Arc<Mutex<EncodeLog>>,
    }

    impl FrameEncoder for FakeEncoder {
        fn encode(&mut self, _frame: &RawFrame, keyframe: bool) -> Result<(), EncodeError> {
            let mut log = self.log.lock().unwrap();
            if log.fail_next {
                log.fail_next = false;
                return Err(EncodeError::Backend("synthetic".into()));
            }
            log.submissions.push(keyframe);
            Ok(())
        }
    }

    fn controller(policy: SendPolicy) -> (Arc<Mutex<EncodeLog>>, SendController) {
        let log = Arc::new(Mutex::new(EncodeLog::default()));
        let encoder = FakeEncoder {
            log: Arc::clone(&log),
        };
        (log, SendController::new(Box::new(encoder), policy))
    }

    fn raw_frame() -> RawFrame {
        RawFrame {
            width: 4,
            height: 4,
            timestamp_us: 0,
            data: Bytes::from_static(&[0; 64]),
        }
    }

    #[test]
    fn first_frame_is_keyframe() {
        let (log, mut ctl) = controller(SendPolicy::default());
        let outcome = ctl.process_frame(raw_frame(), 0, true).unwrap();
        assert_eq!(outcome, SendOutcome::Submitted { keyframe: true });
        // Cleared on submission; next frame is a delta.
        let outcome = ctl.process_frame(raw_frame(), 0, true).unwrap();
        assert_eq!(outcome, SendOutcome::Submitted { keyframe: false });
        assert_eq!(log.lock().unwrap().submissions, vec![true, false]);
    }

    #[test]
    fn backlog_drops_frame_and_preserves_request() {
        let (log, mut ctl) = controller(SendPolicy {
            drop_threshold: 100,
            ..SendPolicy::default()
        });
        let outcome = ctl.process_frame(raw_frame(), 101, true).unwrap();
        assert_eq!(outcome, SendOutcome::Dropped);
        assert!(log.lock().unwrap().submissions.is_empty());
        assert!(ctl.state().force_keyframe);

        // Backlog drains: the preserved request goes out.
        let outcome = ctl.process_frame(raw_frame(), 100, true).unwrap();
        assert_eq!(outcome, SendOutcome::Submitted { keyframe: true });
    }

    #[test]
    fn keyframe_cadence() {
        let (log, mut ctl) = controller(SendPolicy {
            keyframe_interval: 5,
            ..SendPolicy::default()
        });
        for _ in 0..10 {
            ctl.process_frame(raw_frame(), 0, true).unwrap();
        }
        let submissions = log.lock().unwrap().submissions.clone();
        // Frame 1 (initial), 5 and 10 (cadence).
        assert_eq!(
            submissions,
            vec![true, false, false, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn offline_transport_releases_without_drop() {
        let (log, mut ctl) = controller(SendPolicy::default());
        let outcome = ctl.process_frame(raw_frame(), 0, false).unwrap();
        assert_eq!(outcome, SendOutcome::Offline);
        assert!(log.lock().unwrap().submissions.is_empty());
        assert!(ctl.state().force_keyframe);
    }

    #[test]
    fn encode_failure_continue_policy() {
        let (log, mut ctl) = controller(SendPolicy::default());
        log.lock().unwrap().fail_next = true;
        let outcome = ctl.process_frame(raw_frame(), 0, true).unwrap();
        assert_eq!(outcome, SendOutcome::EncodeFailed);
        // Keyframe request survives the failure.
        assert!(ctl.state().force_keyframe);
        let outcome = ctl.process_frame(raw_frame(), 0, true).unwrap();
        assert_eq!(outcome, SendOutcome::Submitted { keyframe: true });
    }

    #[test]
    fn encode_failure_fatal_policy() {
        let (log, mut ctl) = controller(SendPolicy {
            on_encode_error: EncodeErrorPolicy::Fatal,
            ..SendPolicy::default()
        });
        log.lock().unwrap().fail_next = true;
        assert!(ctl.process_frame(raw_frame(), 0, true).is_err());
    }

    #[test]
    fn join_request_reaches_next_submission() {
        let (log, mut ctl) = controller(SendPolicy::default());
        ctl.process_frame(raw_frame(), 0, true).unwrap();
        ctl.state_mut().force_keyframe = true;
        ctl.process_frame(raw_frame(), 0, true).unwrap();
        assert_eq!(log.lock().unwrap().submissions, vec![true, true]);
    }
}
