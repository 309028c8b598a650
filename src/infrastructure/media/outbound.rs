//! Ordered outbound audio queue
//!
//! Carries synthesized frames (and playback marks) from the speaker to the
//! transport writer. Items must be enqueued with consecutive sequence
//! numbers; the writer observes them in exactly that order. When the queue
//! is full the producer waits, so audio is paused rather than dropped.

use crate::domain::shared::{CallError, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundItem {
    Audio(Bytes),
    /// Named playback checkpoint; the carrier echoes it back once played
    Mark(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedItem {
    pub sequence: u64,
    pub item: OutboundItem,
}

struct QueueState {
    items: VecDeque<SequencedItem>,
    next_sequence: u64,
    closed: bool,
}

pub struct OutboundAudioQueue {
    state: Mutex<QueueState>,
    max_depth: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl OutboundAudioQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(max_depth),
                next_sequence: 0,
                closed: false,
            }),
            max_depth: max_depth.max(1),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Sequence number the next enqueued item must carry
    pub async fn next_sequence(&self) -> u64 {
        self.state.lock().await.next_sequence
    }

    /// Enqueue without waiting
    ///
    /// Fails with `OutOfOrderFrame` when `sequence` is not the next expected
    /// one, and with `BufferOverflow` when the queue is at its maximum depth.
    pub async fn try_enqueue(&self, sequence: u64, item: OutboundItem) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::check_order(&state, sequence)?;
        if state.closed {
            return Err(CallError::Transport("outbound queue closed".to_string()));
        }
        if state.items.len() >= self.max_depth {
            return Err(CallError::BufferOverflow(format!(
                "outbound queue at maximum depth {}",
                self.max_depth
            )));
        }

        Self::push(&mut state, sequence, item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue, waiting for room while the writer drains
    ///
    /// Returns `Ok(false)` if `cancel` fired before there was room.
    pub async fn enqueue(
        &self,
        sequence: u64,
        item: OutboundItem,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        loop {
            let room = self.not_full.notified();
            // A cancelled producer must not take room freed by `clear`
            if cancel.is_cancelled() {
                return Ok(false);
            }
            {
                let mut state = self.state.lock().await;
                Self::check_order(&state, sequence)?;
                if state.closed {
                    return Err(CallError::Transport("outbound queue closed".to_string()));
                }
                if state.items.len() < self.max_depth {
                    Self::push(&mut state, sequence, item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(true);
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                _ = room => {}
            }
        }
    }

    /// Wait for the next item; `None` once closed and drained
    pub async fn next(&self) -> Option<SequencedItem> {
        loop {
            let ready = self.not_empty.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            ready.await;
        }
    }

    /// Discard queued items; the sequence keeps counting
    pub async fn clear(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock().await;
            let discarded = state.items.len();
            state.items.clear();
            discarded
        };
        self.not_full.notify_waiters();
        discarded
    }

    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.not_empty.notify_waiters();
        self.not_empty.notify_one();
        self.not_full.notify_waiters();
    }

    pub async fn depth(&self) -> usize {
        self.state.lock().await.items.len()
    }

    fn check_order(state: &QueueState, sequence: u64) -> Result<()> {
        if sequence != state.next_sequence {
            return Err(CallError::OutOfOrderFrame {
                expected: state.next_sequence,
                got: sequence,
            });
        }
        Ok(())
    }

    fn push(state: &mut QueueState, sequence: u64, item: OutboundItem) {
        state.items.push_back(SequencedItem { sequence, item });
        state.next_sequence = sequence + 1;
    }
}
