//! Throughput and drop accounting.
//!
//! The session records byte counts as it sends and receives; once per window
//! the sampler closes the books, publishes a report on a watch channel, and
//! starts a fresh window. Rates are instantaneous over the just-closed
//! window; the drop count is cumulative since session start, which is what a
//! status badge wants to show.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Snapshot published once per reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandwidthReport {
    /// Upload rate over the last window, kilobits per second.
    pub upload_kbps: f64,
    /// Download rate over the last window, kilobits per second.
    pub download_kbps: f64,
    /// Frames dropped by the send policy since the session started.
    pub dropped_frames: u64,
}

pub struct BandwidthSampler {
    interval: Interval,
    window_start: Instant,
    upload_bytes: u64,
    download_bytes: u64,
    window_drops: u64,
    total_drops: u64,
    tx: watch::Sender<BandwidthReport>,
}

impl BandwidthSampler {
    /// Create a sampler and the readout channel it publishes on.
    pub fn new(window: Duration) -> (Self, watch::Receiver<BandwidthReport>) {
        let (tx, rx) = watch::channel(BandwidthReport::default());
        let start = Instant::now();
        let mut interval = interval_at(start + window, window);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        (
            Self {
                interval,
                window_start: start,
                upload_bytes: 0,
                download_bytes: 0,
                window_drops: 0,
                total_drops: 0,
                tx,
            },
            rx,
        )
    }

    pub fn record_upload(&mut self, bytes: usize) {
        self.upload_bytes += bytes as u64;
    }

    pub fn record_download(&mut self, bytes: usize) {
        self.download_bytes += bytes as u64;
    }

    pub fn record_drop(&mut self) {
        self.window_drops += 1;
    }

    /// Total frames dropped since session start.
    pub fn dropped_frames(&self) -> u64 {
        self.total_drops + self.window_drops
    }

    /// Wait for the current window to elapse, then close it and return the
    /// published report.
    pub async fn tick(&mut self) -> BandwidthReport {
        self.interval.tick().await;
        let elapsed = self.window_start.elapsed();
        self.close_window(elapsed)
    }

    fn close_window(&mut self, elapsed: Duration) -> BandwidthReport {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        self.total_drops += self.window_drops;
        let report = BandwidthReport {
            upload_kbps: self.upload_bytes as f64 * 8.0 / secs / 1000.0,
            download_kbps: self.download_bytes as f64 * 8.0 / secs / 1000.0,
            dropped_frames: self.total_drops,
        };
        self.upload_bytes = 0;
        self.download_bytes = 0;
        self.window_drops = 0;
        self.window_start = Instant::now();
        self.tx.send_replace(report);
        report
    }
}
