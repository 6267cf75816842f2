//! Bounded session context buffer
//!
//! Holds the rolling window of recent conversation turns the control loop
//! feeds into prompt assembly. Transient by design: never persisted, never
//! consolidated, oldest messages dropped once capacity is reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single message in the session context buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Speaker role (e.g. "user", "operator", "system")
    pub role: String,
    /// Message content
    pub content: String,
    /// When the message was recorded
    pub timestamp: DateTime<Utc>,
}

/// Capacity-bounded FIFO of recent context messages
pub struct ContextBuffer {
    capacity: usize,
    messages: Arc<RwLock<VecDeque<ContextMessage>>>,
}

impl ContextBuffer {
    /// Create a buffer holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.max(1)))),
        }
    }

    /// Append a message, dropping the oldest if at capacity
    pub async fn push(&self, role: impl Into<String>, content: impl Into<String>) {
        let mut messages = self.messages.write().await;
        if messages.len() == self.capacity {
            messages.pop_front();
        }
        messages.push_back(ContextMessage {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Snapshot the buffer contents, oldest first
    pub async fn snapshot(&self) -> Vec<ContextMessage> {
        self.messages.read().await.iter().cloned().collect()
    }

    /// Current number of buffered messages
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Check whether the buffer is empty
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Drop all buffered messages
    pub async fn clear(&self) {
        self.messages.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_and_snapshot() {
        let buffer = ContextBuffer::new(10);
        buffer.push("user", "hello").await;
        buffer.push("operator", "hi there").await;

        let messages = buffer.snapshot().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content, "hi there");
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let buffer = ContextBuffer::new(3);
        for i in 0..5 {
            buffer.push("user", format!("message {i}")).await;
        }

        let messages = buffer.snapshot().await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "message 2");
        assert_eq!(messages[2].content, "message 4");
    }

    #[tokio::test]
    async fn test_clear() {
        let buffer = ContextBuffer::new(5);
        buffer.push("user", "x").await;
        assert!(!buffer.is_empty().await);

        buffer.clear().await;
        assert!(buffer.is_empty().await);
        assert_eq!(buffer.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let buffer = ContextBuffer::new(0);
        buffer.push("user", "a").await;
        buffer.push("user", "b").await;
        assert_eq!(buffer.len().await, 1);
        assert_eq!(buffer.snapshot().await[0].content, "b");
    }
}
