//! Last-known state of every source ever accepted
//!
//! The map is a `DashMap` so lookups for different sources never share a
//! lock. Each entry carries its own mutex; status, sequence and timestamp
//! are replaced together under it.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use quanta::{Clock, Instant};
use tokio::sync::Mutex;

use telerelay_protocol::{snapshot_line, SourceId, SourceStatus};

/// Mutable attributes of a source, always written as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceState {
    pub sequence: u16,
    pub status: SourceStatus,
    pub updated_at: Instant,
}

/// Point-in-time view of one source for listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub id: SourceId,
    pub sequence: u16,
    pub status: SourceStatus,
    /// Hundredths of a second since the last accepted frame
    pub age_centis: u64,
}

impl SourceSnapshot {
    pub fn line(&self) -> String {
        snapshot_line(&self.id, self.sequence, self.status, Some(self.age_centis))
    }
}

pub struct SourceRegistry {
    sources: DashMap<SourceId, Arc<Mutex<SourceState>>>,
    clock: Clock,
}

impl SourceRegistry {
    pub fn new(clock: Clock) -> Self {
        Self {
            sources: DashMap::new(),
            clock,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Record an accepted frame, stamped with the registry clock.
    ///
    /// Returns true when this is the first frame seen for `id`.
    pub async fn upsert(&self, id: SourceId, status: SourceStatus, sequence: u16) -> bool {
        self.upsert_at(id, status, sequence, self.clock.now()).await
    }

    pub async fn upsert_at(
        &self,
        id: SourceId,
        status: SourceStatus,
        sequence: u16,
        now: Instant,
    ) -> bool {
        let state = SourceState {
            sequence,
            status,
            updated_at: now,
        };

        // Entry guard must be released before awaiting the per-source lock
        let slot = match self.sources.entry(id) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(state)));
                return true;
            }
        };

        *slot.lock().await = state;
        false
    }

    pub async fn get(&self, id: &SourceId) -> Option<SourceSnapshot> {
        let slot = self.sources.get(id).map(|entry| Arc::clone(entry.value()))?;
        let now = self.clock.now();
        let state = *slot.lock().await;
        Some(to_snapshot(*id, state, now))
    }

    pub async fn snapshot(&self) -> Vec<SourceSnapshot> {
        self.snapshot_at(self.clock.now()).await
    }

    /// Every known source as of `now`. Order is unspecified.
    pub async fn snapshot_at(&self, now: Instant) -> Vec<SourceSnapshot> {
        // Copy the slots out first; shard guards cannot be held across awaits
        let slots: Vec<(SourceId, Arc<Mutex<SourceState>>)> = self
            .sources
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut snapshots = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            let state = *slot.lock().await;
            snapshots.push(to_snapshot(id, state, now));
        }
        snapshots
    }

    /// Snapshot rendered as listener lines, one per source
    pub async fn render_snapshot(&self) -> Bytes {
        let lines: String = self
            .snapshot()
            .await
            .iter()
            .map(SourceSnapshot::line)
            .collect();
        Bytes::from(lines)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(Clock::new())
    }
}

fn to_snapshot(id: SourceId, state: SourceState, now: Instant) -> SourceSnapshot {
    SourceSnapshot {
        id,
        sequence: state.sequence,
        status: state.status,
        age_centis: age_centis(now, state.updated_at),
    }
}

/// Elapsed seconds scaled by 100, truncated
fn age_centis(now: Instant, then: Instant) -> u64 {
    (now.saturating_duration_since(then).as_millis() / 10) as u64
}
