//! Protocol constants shared by the framer, the send policy, and the bins.

use std::time::Duration;

/// Bytes of envelope preceding the payload: 4-byte LE peer id + 1 keyframe flag.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Default relay endpoint path. The room name rides on the query/path chosen
/// by the deployment; this is the mount point the reference relay serves.
pub const DEFAULT_SOCKET_PATH: &str = "/vs-socket/";

/// Outbound backlog (queued-but-unsent bytes) above which captured frames are
/// dropped instead of encoded.
pub const DEFAULT_DROP_THRESHOLD: usize = 64 * 1024;

/// Strictest supported operating point: drop whenever anything is queued.
pub const AGGRESSIVE_DROP_THRESHOLD: usize = 1;

/// Force a keyframe out of the encoder every N captured frames so late
/// joiners never wait long for a sync point.
pub const DEFAULT_KEYFRAME_INTERVAL: u64 = 100;

/// Bandwidth reporting window.
pub const BANDWIDTH_WINDOW: Duration = Duration::from_secs(1);

/// Out-of-band text token announcing a keyframe in the legacy single-peer
/// framing profile.
pub const LEGACY_KEY_TOKEN: &str = "key";
