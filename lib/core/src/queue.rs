//! Bounded k-way merge queue for ranked shard results.
//!
//! The queue keeps the best `capacity` documents seen so far. The root of the
//! heap is always the document ranking lowest, so deciding whether a new
//! document gets in costs a single comparison.

use crate::{ShardDocument, SortSpec};
use std::sync::Arc;

pub struct ShardSortMergeQueue {
    sort: SortSpec,
    capacity: usize,
    // heap[0] ranks lowest
    heap: Vec<Arc<ShardDocument>>,
}

impl ShardSortMergeQueue {
    pub fn new(sort: SortSpec, capacity: usize) -> Self {
        Self {
            sort,
            capacity,
            heap: Vec::with_capacity(capacity.min(1024)),
        }
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The lowest-ranking document currently held.
    pub fn peek_worst(&self) -> Option<&Arc<ShardDocument>> {
        self.heap.first()
    }

    /// Queued documents in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShardDocument>> {
        self.heap.iter()
    }

    /// Plain bounded insert.
    ///
    /// Returns `None` if the document was added without displacing anything,
    /// the evicted lowest-ranking document if the queue was full, or `doc`
    /// itself if it did not rank high enough to get in.
    pub fn insert_with_overflow(&mut self, doc: Arc<ShardDocument>) -> Option<Arc<ShardDocument>> {
        if self.heap.len() < self.capacity {
            self.heap.push(doc);
            self.up_heap(self.heap.len() - 1);
            None
        } else if !self.heap.is_empty() && !self.less_than(&doc, &self.heap[0]) {
            let evicted = std::mem::replace(&mut self.heap[0], doc);
            self.down_heap(0);
            Some(evicted)
        } else {
            Some(doc)
        }
    }

    /// Insert, collapsing documents that share an id to the best-ranked copy.
    ///
    /// If a document with the same id is queued and ranks below `doc`, it is
    /// removed, `doc` takes its place and the removed document is returned.
    /// If the queued copy ranks at least as well, `doc` is returned unchanged.
    /// Otherwise this behaves like [`insert_with_overflow`](Self::insert_with_overflow).
    pub fn insert_with_replacement(&mut self, doc: Arc<ShardDocument>) -> Option<Arc<ShardDocument>> {
        match self.heap.iter().position(|queued| queued.id == doc.id) {
            Some(i) => {
                if self.less_than(&self.heap[i], &doc) {
                    let old = self.remove_at(i);
                    let overflow = self.insert_with_overflow(doc);
                    debug_assert!(overflow.is_none());
                    Some(old)
                } else {
                    Some(doc)
                }
            }
            None => self.insert_with_overflow(doc),
        }
    }

    /// Remove and return the lowest-ranking document.
    pub fn pop(&mut self) -> Option<Arc<ShardDocument>> {
        if self.heap.is_empty() {
            return None;
        }
        let worst = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.down_heap(0);
        }
        Some(worst)
    }

    /// Drain the queue, best-ranked document first.
    pub fn into_sorted_vec(mut self) -> Vec<Arc<ShardDocument>> {
        let mut docs = Vec::with_capacity(self.heap.len());
        while let Some(doc) = self.pop() {
            docs.push(doc);
        }
        docs.reverse();
        docs
    }

    #[inline]
    fn less_than(&self, a: &ShardDocument, b: &ShardDocument) -> bool {
        self.sort.ranks_below(a, b)
    }

    fn remove_at(&mut self, i: usize) -> Arc<ShardDocument> {
        let removed = self.heap.swap_remove(i);
        if i < self.heap.len() {
            self.down_heap(i);
            self.up_heap(i);
        }
        removed
    }

    fn up_heap(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.less_than(&self.heap[i], &self.heap[parent]) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn down_heap(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < len && self.less_than(&self.heap[right], &self.heap[left]) {
                child = right;
            }
            if self.less_than(&self.heap[child], &self.heap[i]) {
                self.heap.swap(i, child);
                i = child;
            } else {
                break;
            }
        }
    }
}
