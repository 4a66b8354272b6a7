//! Progress publishing
//!
//! The orchestrator writes scan events to a hub; any number of observers
//! (web sockets, the CLI spinner) subscribe independently.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};

use crate::model::{SnapshotStatus, Totals};

const EVENT_CAPACITY: usize = 256;

/// Live counters of the scan currently running
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub snapshot_id: i64,
    pub mount_point: String,
    pub path_being_scanned: String,
    pub entries_processed: u64,
    pub errors_recorded: u64,
    pub elapsed_ms: u64,
}

/// Events pushed to observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        snapshot_id: i64,
        mount_point: String,
    },
    Progress(ScanProgress),
    /// Terminal event for one snapshot
    Finished {
        snapshot_id: i64,
        mount_point: String,
        status: SnapshotStatus,
        totals: Option<Totals>,
        entries_processed: u64,
        errors_recorded: u64,
        elapsed_ms: u64,
    },
}

/// Fan-out point for scan events plus the latest progress value
#[derive(Clone)]
pub struct ProgressHub {
    events: broadcast::Sender<ScanEvent>,
    current: Arc<watch::Sender<Option<ScanProgress>>>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (current, _) = watch::channel(None);
        Self { events, current: Arc::new(current) }
    }

    /// Receive every event published from now on.
    ///
    /// A slow receiver skips ahead (`RecvError::Lagged`) rather than
    /// holding back the scan.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Progress of the running scan, None when idle
    pub fn current(&self) -> Option<ScanProgress> {
        self.current.borrow().clone()
    }

    pub fn publish(&self, event: ScanEvent) {
        match &event {
            ScanEvent::Started { snapshot_id, mount_point } => {
                self.current.send_replace(Some(ScanProgress {
                    snapshot_id: *snapshot_id,
                    mount_point: mount_point.clone(),
                    path_being_scanned: mount_point.clone(),
                    entries_processed: 0,
                    errors_recorded: 0,
                    elapsed_ms: 0,
                }));
            }
            ScanEvent::Progress(progress) => {
                self.current.send_replace(Some(progress.clone()));
            }
            ScanEvent::Finished { .. } => {
                self.current.send_replace(None);
            }
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Rate limiter for progress events
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True at most once per interval
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(entries: u64) -> ScanProgress {
        ScanProgress {
            snapshot_id: 1,
            mount_point: "/data".into(),
            path_being_scanned: "/data/a".into(),
            entries_processed: entries,
            errors_recorded: 0,
            elapsed_ms: 10,
        }
    }

    #[test]
    fn test_current_tracks_lifecycle() {
        let hub = ProgressHub::new();
        assert!(hub.current().is_none());

        hub.publish(ScanEvent::Started { snapshot_id: 1, mount_point: "/data".into() });
        assert_eq!(hub.current().unwrap().entries_processed, 0);

        hub.publish(ScanEvent::Progress(progress(42)));
        assert_eq!(hub.current().unwrap().entries_processed, 42);

        hub.publish(ScanEvent::Finished {
            snapshot_id: 1,
            mount_point: "/data".into(),
            status: SnapshotStatus::Completed,
            totals: None,
            entries_processed: 42,
            errors_recorded: 0,
            elapsed_ms: 20,
        });
        assert!(hub.current().is_none());
    }

    #[test]
    fn test_subscribers_receive_events() {
        let hub = ProgressHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(ScanEvent::Progress(progress(3)));

        assert!(matches!(a.try_recv(), Ok(ScanEvent::Progress(p)) if p.entries_processed == 3));
        assert!(matches!(b.try_recv(), Ok(ScanEvent::Progress(_))));
    }

    #[test]
    fn test_throttle() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(3600));
        assert!(throttle.ready());
        assert!(!throttle.ready());

        let mut always = ProgressThrottle::new(Duration::ZERO);
        assert!(always.ready());
        assert!(always.ready());
    }
}
