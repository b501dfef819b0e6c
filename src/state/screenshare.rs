//! Screen-share state and bandwidth accounting.
//!
//! One share per sharer connection, with per-share statistics and a
//! viewer set. Upload is policed by a fixed 1-second byte window per
//! sender: frames that would exceed the ceiling are dropped silently
//! and counted, never queued. The per-viewer download window is
//! advisory and enforced by dropping fan-out frames to that viewer.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_proto::{ScreenQuality, ScreenShare};

use super::connections::ConnId;

const WINDOW: Duration = Duration::from_secs(1);

struct Bucket {
    window_start: Instant,
    used: u64,
}

/// Fixed-window byte buckets keyed by connection.
pub struct BandwidthLedger {
    buckets: DashMap<ConnId, Bucket>,
    ceiling: u64,
}

impl BandwidthLedger {
    /// Ledger with a bytes-per-window ceiling.
    pub fn new(ceiling: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            ceiling,
        }
    }

    /// Try to charge `bytes` against the window at time `now`.
    ///
    /// Rejected charges leave the bucket unchanged, so one oversize
    /// frame cannot starve subsequent smaller ones.
    pub fn admit(&self, conn_id: &str, bytes: u64, now: Instant) -> bool {
        let mut bucket = self
            .buckets
            .entry(conn_id.to_string())
            .or_insert_with(|| Bucket {
                window_start: now,
                used: 0,
            });
        if now.duration_since(bucket.window_start) >= WINDOW {
            bucket.window_start = now;
            bucket.used = 0;
        }
        if bucket.used + bytes > self.ceiling {
            return false;
        }
        bucket.used += bytes;
        true
    }

    /// Purge a connection's bucket on disconnect.
    pub fn purge(&self, conn_id: &str) {
        self.buckets.remove(conn_id);
    }
}

/// State of one active share.
#[derive(Clone)]
pub struct ShareState {
    /// Voice channel the share lives in.
    pub channel_id: String,
    /// Sharer display name (denormalized for listings).
    pub username: String,
    /// When the share started.
    pub started_at: DateTime<Utc>,
    /// Frames relayed so far.
    pub frames_sent: u64,
    /// Frames dropped by the upload ceiling.
    pub frames_dropped: u64,
    /// Bytes relayed so far.
    pub bytes_sent: u64,
    /// Last frame dimensions.
    pub width: u32,
    /// Last frame dimensions.
    pub height: u32,
    /// When the last frame was admitted.
    pub last_frame_at: Option<Instant>,
    /// Connections watching this share.
    pub viewers: HashSet<ConnId>,
    /// Current quality label.
    pub quality: ScreenQuality,
}

/// Verdict for an incoming screen frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// Relay to the channel.
    Relay,
    /// Silently dropped by the bandwidth ceiling.
    Drop,
}

/// Screen-share registry plus both bandwidth ledgers.
pub struct ScreenShareManager {
    shares: DashMap<ConnId, ShareState>,
    upload: BandwidthLedger,
    download: BandwidthLedger,
}

impl ScreenShareManager {
    /// Registry with the given upload/download ceilings (bytes/sec).
    pub fn new(upload_ceiling: u64, download_ceiling: u64) -> Self {
        Self {
            shares: DashMap::new(),
            upload: BandwidthLedger::new(upload_ceiling),
            download: BandwidthLedger::new(download_ceiling),
        }
    }

    /// Begin a share. At most one per connection.
    pub fn start(&self, conn_id: &str, channel_id: &str, username: &str) -> bool {
        if self.shares.contains_key(conn_id) {
            return false;
        }
        self.shares.insert(
            conn_id.to_string(),
            ShareState {
                channel_id: channel_id.to_string(),
                username: username.to_string(),
                started_at: Utc::now(),
                frames_sent: 0,
                frames_dropped: 0,
                bytes_sent: 0,
                width: 0,
                height: 0,
                last_frame_at: None,
                viewers: HashSet::new(),
                quality: ScreenQuality::default(),
            },
        );
        true
    }

    /// End a share, returning its final state (viewer set included, so
    /// the caller can notify watchers).
    pub fn stop(&self, conn_id: &str) -> Option<ShareState> {
        self.shares.remove(conn_id).map(|(_, s)| s)
    }

    /// Whether the connection is currently sharing.
    pub fn is_sharing(&self, conn_id: &str) -> bool {
        self.shares.contains_key(conn_id)
    }

    /// Account an incoming frame against the sharer's upload window and
    /// update share statistics.
    pub fn record_frame(
        &self,
        conn_id: &str,
        bytes: u64,
        width: u32,
        height: u32,
        now: Instant,
    ) -> Option<FrameDecision> {
        // Charge the ledger outside the share entry lock.
        let admitted = self.upload.admit(conn_id, bytes, now);
        let mut share = self.shares.get_mut(conn_id)?;
        if admitted {
            share.frames_sent += 1;
            share.bytes_sent += bytes;
            share.width = width;
            share.height = height;
            share.last_frame_at = Some(now);
            Some(FrameDecision::Relay)
        } else {
            share.frames_dropped += 1;
            Some(FrameDecision::Drop)
        }
    }

    /// Advisory download check for one viewer.
    pub fn admit_download(&self, viewer_conn: &str, bytes: u64, now: Instant) -> bool {
        self.download.admit(viewer_conn, bytes, now)
    }

    /// Add a viewer; returns the new viewer count.
    pub fn join_viewer(&self, sharer_conn: &str, viewer_conn: &str) -> Option<usize> {
        let mut share = self.shares.get_mut(sharer_conn)?;
        share.viewers.insert(viewer_conn.to_string());
        Some(share.viewers.len())
    }

    /// Remove a viewer; returns the new viewer count.
    pub fn leave_viewer(&self, sharer_conn: &str, viewer_conn: &str) -> Option<usize> {
        let mut share = self.shares.get_mut(sharer_conn)?;
        share.viewers.remove(viewer_conn);
        Some(share.viewers.len())
    }

    /// Share statistics snapshot.
    pub fn share_of(&self, conn_id: &str) -> Option<ShareState> {
        self.shares.get(conn_id).map(|s| s.clone())
    }

    /// Set the sharer's advertised quality label.
    pub fn set_quality(&self, conn_id: &str, quality: ScreenQuality) -> bool {
        match self.shares.get_mut(conn_id) {
            Some(mut share) => {
                share.quality = quality;
                true
            }
            None => false,
        }
    }

    /// Shares active in one channel, as wire listings.
    pub fn active_in_channel(&self, channel_id: &str) -> Vec<ScreenShare> {
        self.shares
            .iter()
            .filter(|entry| entry.channel_id == channel_id)
            .map(|entry| ScreenShare {
                sharer_connection_id: entry.key().clone(),
                username: entry.username.clone(),
                channel_id: entry.channel_id.clone(),
                width: entry.width,
                height: entry.height,
                viewer_count: entry.viewers.len() as u32,
                quality: entry.quality,
            })
            .collect()
    }

    /// Disconnect cleanup: end the connection's own share, remove it
    /// from every viewer set, and purge its buckets.
    ///
    /// Returns the ended share (if any) and the sharers whose viewer
    /// sets shrank, with their new counts.
    pub fn purge_connection(&self, conn_id: &str) -> (Option<ShareState>, Vec<(ConnId, usize)>) {
        let own = self.stop(conn_id);
        let mut affected = Vec::new();
        for mut entry in self.shares.iter_mut() {
            if entry.viewers.remove(conn_id) {
                affected.push((entry.key().clone(), entry.viewers.len()));
            }
        }
        self.upload.purge(conn_id);
        self.download.purge(conn_id);
        (own, affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn window_admits_up_to_ceiling_exactly() {
        // Scenario: 30 MiB window, 200 KiB frames -> exactly 153 admitted.
        let ledger = BandwidthLedger::new(30 * MIB);
        let frame = 200 * 1024;
        let now = Instant::now();

        let mut admitted = 0;
        let mut dropped = 0;
        for _ in 0..200 {
            if ledger.admit("c1", frame, now) {
                admitted += 1;
            } else {
                dropped += 1;
            }
        }
        assert_eq!(admitted, 153);
        assert_eq!(dropped, 47);
    }

    #[test]
    fn rejected_frames_leave_bucket_unchanged() {
        let ledger = BandwidthLedger::new(1000);
        let now = Instant::now();
        assert!(ledger.admit("c1", 900, now));
        // Too big; bucket stays at 900.
        assert!(!ledger.admit("c1", 200, now));
        // A smaller frame still fits.
        assert!(ledger.admit("c1", 100, now));
    }

    #[test]
    fn window_resets_at_boundary() {
        let ledger = BandwidthLedger::new(1000);
        let start = Instant::now();
        assert!(ledger.admit("c1", 1000, start));
        assert!(!ledger.admit("c1", 1, start));
        assert!(ledger.admit("c1", 1000, start + Duration::from_secs(1)));
    }

    #[test]
    fn per_sender_isolation() {
        let ledger = BandwidthLedger::new(500);
        let now = Instant::now();
        assert!(ledger.admit("c1", 500, now));
        assert!(ledger.admit("c2", 500, now));
        assert!(!ledger.admit("c1", 1, now));
    }

    #[test]
    fn frame_stats_track_decisions() {
        let manager = ScreenShareManager::new(1000, 10_000);
        assert!(manager.start("c1", "v1", "ada"));
        // Second share on the same connection refused.
        assert!(!manager.start("c1", "v1", "ada"));

        let now = Instant::now();
        assert_eq!(
            manager.record_frame("c1", 800, 800, 600, now),
            Some(FrameDecision::Relay)
        );
        assert_eq!(
            manager.record_frame("c1", 800, 800, 600, now),
            Some(FrameDecision::Drop)
        );

        let share = manager.share_of("c1").unwrap();
        assert_eq!(share.frames_sent, 1);
        assert_eq!(share.frames_dropped, 1);
        assert_eq!(share.bytes_sent, 800);
        assert_eq!((share.width, share.height), (800, 600));
    }

    #[test]
    fn purge_drops_share_and_viewer_entries() {
        let manager = ScreenShareManager::new(1000, 1000);
        manager.start("sharer", "v1", "ada");
        manager.start("other", "v1", "bob");
        manager.join_viewer("other", "sharer");

        let (own, affected) = manager.purge_connection("sharer");
        assert!(own.is_some());
        assert_eq!(affected, vec![("other".to_string(), 0)]);
        assert!(!manager.is_sharing("sharer"));
        assert_eq!(manager.active_in_channel("v1").len(), 1);
    }
}
