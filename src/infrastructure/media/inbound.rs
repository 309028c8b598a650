//! Inbound audio buffer
//!
//! Decouples the transport reader from transcription. The reader never
//! waits: when the consumer falls behind, the oldest audio is dropped.

use super::frame::MediaFrame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// Inbound buffer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub depth: usize,
}

pub struct InboundAudioBuffer {
    frames: Mutex<VecDeque<MediaFrame>>,
    capacity: usize,
    available: Notify,
    closed: AtomicBool,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

impl InboundAudioBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            closed: AtomicBool::new(false),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Add a frame, evicting the oldest one when full
    ///
    /// Returns `true` if a frame was dropped to make room.
    pub async fn push(&self, frame: MediaFrame) -> bool {
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let dropped = {
            let mut frames = self.frames.lock().await;
            let dropped = if frames.len() >= self.capacity {
                frames.pop_front();
                true
            } else {
                false
            };
            frames.push_back(frame);
            dropped
        };

        if dropped {
            let total = self.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total == 1 || total % 50 == 0 {
                warn!(
                    "Inbound audio buffer full, dropping oldest frame ({} dropped so far)",
                    total
                );
            }
        }

        self.available.notify_one();
        dropped
    }

    /// Wait for the next frame; `None` once closed and drained
    pub async fn pop(&self) -> Option<MediaFrame> {
        loop {
            let notified = self.available.notified();
            {
                let mut frames = self.frames.lock().await;
                if let Some(frame) = frames.pop_front() {
                    return Some(frame);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take whatever is buffered without waiting
    pub async fn drain(&self) -> Vec<MediaFrame> {
        self.frames.lock().await.drain(..).collect()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_waiters();
        self.available.notify_one();
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> InboundStats {
        InboundStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped(),
            depth: self.frames.lock().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(tag: u8) -> MediaFrame {
        MediaFrame::new(Bytes::from(vec![tag; 4]))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let buffer = InboundAudioBuffer::new(10);
        buffer.push(frame(1)).await;
        buffer.push(frame(2)).await;

        assert_eq!(buffer.pop().await.unwrap().payload[0], 1);
        assert_eq!(buffer.pop().await.unwrap().payload[0], 2);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let buffer = InboundAudioBuffer::new(2);
        assert!(!buffer.push(frame(1)).await);
        assert!(!buffer.push(frame(2)).await);
        assert!(buffer.push(frame(3)).await);

        let stats = buffer.stats().await;
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.depth, 2);

        assert_eq!(buffer.pop().await.unwrap().payload[0], 2);
        assert_eq!(buffer.pop().await.unwrap().payload[0], 3);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let buffer = Arc::new(InboundAudioBuffer::new(4));
        let consumer = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.push(frame(7)).await;

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unwrap().payload[0], 7);
    }

    #[tokio::test]
    async fn test_close_releases_waiter() {
        let buffer = Arc::new(InboundAudioBuffer::new(4));
        let consumer = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        buffer.close();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }
}
