//! Status callbacks that arrived before their session existed
//!
//! The carrier can report progress for a call before `PlaceCall` has
//! returned its id to us. Such callbacks are parked here for a short time
//! and replayed once the session is registered.

use crate::domain::shared::CallId;
use crate::infrastructure::telephony::CarrierStatus;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct ParkedStatus {
    status: CarrierStatus,
    received_at: Instant,
}

const DEFAULT_MAX_CALLS: usize = 1024;

pub struct PendingCallbacks {
    parked: Mutex<HashMap<CallId, Vec<ParkedStatus>>>,
    ttl: Duration,
    max_per_call: usize,
    max_calls: usize,
}

impl PendingCallbacks {
    pub fn new(ttl: Duration, max_per_call: usize) -> Self {
        Self {
            parked: Mutex::new(HashMap::new()),
            ttl,
            max_per_call: max_per_call.max(1),
            max_calls: DEFAULT_MAX_CALLS,
        }
    }

    /// Bound the number of distinct call ids parked at once
    pub fn with_max_calls(mut self, max_calls: usize) -> Self {
        self.max_calls = max_calls.max(1);
        self
    }

    pub async fn park(&self, call_id: &CallId, status: CarrierStatus) {
        let mut parked = self.parked.lock().await;
        if !parked.contains_key(call_id) && parked.len() >= self.max_calls {
            warn!(
                "Early callback buffer full ({} calls), discarding {} for call {}",
                parked.len(),
                status,
                call_id
            );
            return;
        }
        let entries = parked.entry(call_id.clone()).or_default();
        if entries.len() >= self.max_per_call {
            warn!(
                "Too many early callbacks for call {}, discarding {}",
                call_id, status
            );
            return;
        }
        entries.push(ParkedStatus {
            status,
            received_at: Instant::now(),
        });
        debug!("Parked early {} callback for call {}", status, call_id);
    }

    /// Remove and return unexpired statuses for a call, in arrival order
    pub async fn take(&self, call_id: &CallId) -> Vec<CarrierStatus> {
        let entries = self.parked.lock().await.remove(call_id).unwrap_or_default();
        entries
            .into_iter()
            .filter(|p| p.received_at.elapsed() < self.ttl)
            .map(|p| p.status)
            .collect()
    }

    /// Drop expired entries; returns how many statuses were discarded
    pub async fn purge_expired(&self) -> usize {
        let mut parked = self.parked.lock().await;
        let mut purged = 0;
        parked.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|p| p.received_at.elapsed() < self.ttl);
            purged += before - entries.len();
            !entries.is_empty()
        });
        purged
    }

    pub async fn len(&self) -> usize {
        self.parked.lock().await.values().map(Vec::len).sum()
    }
}
