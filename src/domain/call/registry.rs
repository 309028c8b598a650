//! Call Session Registry
//!
//! Process-wide index of live call sessions. The map lock is only held to
//! insert, look up or remove an entry; every session has its own lock so
//! calls never contend with each other.

use crate::domain::call::aggregate::{CallSession, CallSnapshot};
use crate::domain::call::event::CallEventSink;
use crate::domain::call::value_object::{CallState, EndReason};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

type SessionCell = Arc<Mutex<CallSession>>;

pub struct CallSessionRegistry {
    sessions: RwLock<HashMap<CallId, SessionCell>>,
    events: Arc<dyn CallEventSink>,
    grace_period: Duration,
}

impl CallSessionRegistry {
    pub fn new(events: Arc<dyn CallEventSink>, grace_period: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            grace_period,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Register a new session under its carrier call id
    pub async fn create(&self, mut session: CallSession) -> Result<()> {
        let call_id = session.call_id().clone();
        let events = session.take_events();

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&call_id) {
                return Err(CallError::DuplicateCallId(call_id.to_string()));
            }
            sessions.insert(call_id.clone(), Arc::new(Mutex::new(session)));
        }

        debug!("Registered call session {}", call_id);
        for event in events {
            self.events.publish(event);
        }
        Ok(())
    }

    pub async fn contains(&self, call_id: &CallId) -> bool {
        self.sessions.read().await.contains_key(call_id)
    }

    pub async fn get(&self, call_id: &CallId) -> Option<CallSnapshot> {
        let cell = self.cell(call_id).await?;
        let session = cell.lock().await;
        Some(session.snapshot())
    }

    /// Run `f` with exclusive access to one session
    ///
    /// Events recorded by `f` are published after it returns, whether or
    /// not it succeeded.
    pub async fn update<F, R>(&self, call_id: &CallId, f: F) -> Result<R>
    where
        F: FnOnce(&mut CallSession) -> Result<R>,
    {
        let cell = self
            .cell(call_id)
            .await
            .ok_or_else(|| CallError::CallNotFound(call_id.to_string()))?;

        let (result, events) = {
            let mut session = cell.lock().await;
            let result = f(&mut session);
            (result, session.take_events())
        };

        for event in events {
            self.events.publish(event);
        }
        result
    }

    /// Apply a state transition, returning the previous state
    pub async fn transition(
        &self,
        call_id: &CallId,
        new_state: CallState,
        reason: Option<EndReason>,
    ) -> Result<CallState> {
        self.update(call_id, |session| {
            let from = session.state();
            session.transition_to(new_state, reason)?;
            Ok(from)
        })
        .await
    }

    pub async fn list(&self) -> Vec<CallSnapshot> {
        let cells: Vec<SessionCell> = self.sessions.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(cells.len());
        for cell in cells {
            snapshots.push(cell.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        snapshots
    }

    /// Sessions that have not reached a terminal state
    pub async fn list_active(&self) -> Vec<CallSnapshot> {
        self.list()
            .await
            .into_iter()
            .filter(|s| !s.state.is_terminal())
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.list_active().await.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove terminal sessions whose grace period has elapsed
    pub async fn sweep(&self) -> Vec<CallId> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<CallId> {
        let mut sessions = self.sessions.write().await;

        let expired: Vec<CallId> = sessions
            .iter()
            .filter_map(|(call_id, cell)| {
                // A session locked right now is being worked on; next sweep.
                let session = cell.try_lock().ok()?;
                session
                    .is_expired(now, self.grace_period)
                    .then(|| call_id.clone())
            })
            .collect();

        for call_id in &expired {
            sessions.remove(call_id);
        }

        if !expired.is_empty() {
            info!("Swept {} terminated call sessions", expired.len());
        }
        expired
    }

    async fn cell(&self, call_id: &CallId) -> Option<SessionCell> {
        self.sessions.read().await.get(call_id).cloned()
    }
}
