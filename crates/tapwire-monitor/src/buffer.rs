//! Size-bounded, most-recent-first content history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default byte budget per buffer (1 MiB)
pub const DEFAULT_BUFFER_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferedItem<T> {
    pub content: T,
    pub captured_at: DateTime<Utc>,
    pub estimated_size: usize,
}

/// Serialized JSON length, or 0 if the value cannot be serialized.
pub fn estimate_size<T: Serialize>(content: &T) -> usize {
    serde_json::to_vec(content).map_or(0, |bytes| bytes.len())
}

/// Most-recent-first buffer whose total estimated size stays within
/// `limit`. The newest item is kept even when it alone exceeds the limit.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<BufferedItem<T>>,
    total_size: usize,
    limit: usize,
}

impl<T: Serialize> BoundedBuffer<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            items: VecDeque::new(),
            total_size: 0,
            limit,
        }
    }

    /// Add `content`, sized by its serialized length.
    pub fn push(&mut self, content: T) {
        let size = estimate_size(&content);
        self.push_with_size(content, size);
    }

    pub fn push_with_size(&mut self, content: T, estimated_size: usize) {
        self.items.push_front(BufferedItem {
            content,
            captured_at: Utc::now(),
            estimated_size,
        });
        self.total_size += estimated_size;

        while self.total_size > self.limit && self.items.len() > 1 {
            if let Some(evicted) = self.items.pop_back() {
                self.total_size -= evicted.estimated_size;
            }
        }
    }
}

impl<T> BoundedBuffer<T> {
    pub fn latest(&self) -> Option<&BufferedItem<T>> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedItem<T>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.total_size = 0;
    }
}

/// Request and response histories, each with its own budget.
#[derive(Debug, Clone)]
pub struct ContentBuffers<T> {
    pub requests: BoundedBuffer<T>,
    pub responses: BoundedBuffer<T>,
}

impl<T: Serialize> ContentBuffers<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            requests: BoundedBuffer::new(limit),
            responses: BoundedBuffer::new(limit),
        }
    }
}

impl<T> ContentBuffers<T> {
    pub fn clear(&mut self) {
        self.requests.clear();
        self.responses.clear();
    }
}
