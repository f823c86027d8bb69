//! Counters maintained by the hub loop and readable from any task.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct HubStats {
    active_sessions: AtomicUsize,
    registrations: AtomicU64,
    ticks: AtomicU64,
    broadcasts: AtomicU64,
    pruned_sessions: AtomicU64,
    skipped_ticks: AtomicU64,
}

/// Point-in-time copy of [`HubStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatsSnapshot {
    pub active_sessions: usize,
    pub registrations: u64,
    pub ticks: u64,
    pub broadcasts: u64,
    pub pruned_sessions: u64,
    pub skipped_ticks: u64,
}

impl HubStats {
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            pruned_sessions: self.pruned_sessions.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_active_sessions(&self, count: usize) {
        self.active_sessions.store(count, Ordering::Relaxed);
    }

    pub(crate) fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pruned(&self, count: usize) {
        self.pruned_sessions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_tick(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }
}
