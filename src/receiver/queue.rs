use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use crate::{
    observability::metrics::{record_queue_depth, record_queue_dropped},
    types::FilteredCatalyst,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bounded FIFO between the receiver and the processor. A push into a full
/// queue drops the oldest entry.
#[derive(Debug)]
pub struct CatalystQueue {
    items: Mutex<VecDeque<FilteredCatalyst>>,
    capacity: usize,
    dropped: Mutex<u64>,
}

impl CatalystQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: Mutex::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true when an older entry was dropped to make room.
    pub fn push(&self, catalyst: FilteredCatalyst) -> bool {
        let mut items = lock(&self.items);
        let mut dropped = false;
        while items.len() >= self.capacity {
            items.pop_front();
            dropped = true;
        }
        items.push_back(catalyst);
        record_queue_depth(items.len());
        drop(items);

        if dropped {
            *lock(&self.dropped) += 1;
            record_queue_dropped();
        }
        dropped
    }

    pub fn pop(&self) -> Option<FilteredCatalyst> {
        let mut items = lock(&self.items);
        let item = items.pop_front();
        record_queue_depth(items.len());
        item
    }

    pub fn drain(&self, limit: usize) -> Vec<FilteredCatalyst> {
        let mut items = lock(&self.items);
        let take = limit.min(items.len());
        let drained = items.drain(..take).collect();
        record_queue_depth(items.len());
        drained
    }

    /// Moves everything still queued into `history`, returning how many moved.
    pub fn drain_into(&self, history: &CatalystHistory) -> usize {
        let remaining = self.drain(usize::MAX);
        let count = remaining.len();
        for catalyst in remaining {
            history.record(catalyst);
        }
        count
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    pub fn dropped(&self) -> u64 {
        *lock(&self.dropped)
    }
}

/// Most recent processed catalysts, oldest evicted first.
#[derive(Debug)]
pub struct CatalystHistory {
    items: Mutex<VecDeque<FilteredCatalyst>>,
    capacity: usize,
    total: Mutex<u64>,
}

impl CatalystHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            total: Mutex::new(0),
        }
    }

    pub fn record(&self, catalyst: FilteredCatalyst) {
        let mut items = lock(&self.items);
        items.push_back(catalyst);
        while items.len() > self.capacity {
            items.pop_front();
        }
        drop(items);
        *lock(&self.total) += 1;
    }

    pub fn recent(&self, limit: usize) -> Vec<FilteredCatalyst> {
        let items = lock(&self.items);
        let skip = items.len().saturating_sub(limit);
        items.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    pub fn total_processed(&self) -> u64 {
        *lock(&self.total)
    }
}
