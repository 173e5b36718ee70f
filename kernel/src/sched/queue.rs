//! Per-CPU run queue: a circular singly-linked list of thread-pool indices.
//!
//! The core targets a single boot CPU (`spec.md` §1's Non-goals exclude
//! SMP AP bring-up), so there is exactly one run queue. Links are pool
//! indices stored in `Thread::next`, per the Design Notes' index-based
//! arena guidance — no separate list-node allocation, and nothing here
//! touches the heap.

#![allow(dead_code)]

use super::task::{ThreadPool, ThreadState};

/// A circular run queue over thread-pool indices.
pub struct RunQueue {
    /// Any member of the ring, used as a scan starting point. `None` when
    /// empty.
    anchor: Option<usize>,
}

impl RunQueue {
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor.is_none()
    }

    /// Splice `idx` into the ring just before the anchor, so the ring
    /// traverses in insertion order starting from whichever member was
    /// inserted first (matches S4's creation order T1, T2, T3).
    pub fn insert(&mut self, pool: &mut ThreadPool, idx: usize) {
        match self.anchor {
            None => {
                pool.get_mut(idx).next = Some(idx);
                self.anchor = Some(idx);
            }
            Some(anchor) => {
                let tail = self.predecessor_of(pool, anchor).unwrap_or(anchor);
                pool.get_mut(idx).next = Some(anchor);
                pool.get_mut(tail).next = Some(idx);
            }
        }
    }

    /// Remove `idx` from the ring, wherever it sits. No-op if `idx` isn't a
    /// member (its own `next` is irrelevant once removed).
    pub fn remove(&mut self, pool: &mut ThreadPool, idx: usize) {
        let Some(anchor) = self.anchor else { return };

        if anchor == idx {
            let next = pool.get(idx).next.unwrap_or(idx);
            if next == idx {
                self.anchor = None;
                return;
            }
            // Find idx's predecessor to relink, then move the anchor off idx.
            let pred = self.predecessor_of(pool, idx);
            if let Some(pred) = pred {
                pool.get_mut(pred).next = Some(next);
            }
            self.anchor = Some(next);
            return;
        }

        if let Some(pred) = self.predecessor_of(pool, idx) {
            let next = pool.get(idx).next.unwrap_or(idx);
            pool.get_mut(pred).next = Some(next);
        }
    }

    fn predecessor_of(&self, pool: &ThreadPool, idx: usize) -> Option<usize> {
        let start = self.anchor?;
        let mut cur = start;
        loop {
            let next = pool.get(cur).next.unwrap_or(cur);
            if next == idx {
                return Some(cur);
            }
            if next == start {
                return None;
            }
            cur = next;
        }
    }

    /// Starting just after `from` (or at the anchor if `from` is `None`),
    /// scan the whole ring once and return the highest-priority `Ready`
    /// thread, tie-breaking by whichever is encountered first. Matches
    /// `spec.md` §4.F step 3 exactly.
    pub fn highest_priority_ready(&self, pool: &ThreadPool, from: Option<usize>) -> Option<usize> {
        let start = self.anchor?;
        let first = from
            .and_then(|f| pool.get(f).next)
            .unwrap_or(start);

        let mut best: Option<usize> = None;
        let mut cur = first;
        loop {
            let t = pool.get(cur);
            if t.state == ThreadState::Ready {
                let better = match best {
                    None => true,
                    Some(b) => t.priority > pool.get(b).priority,
                };
                if better {
                    best = Some(cur);
                }
            }
            let next = t.next.unwrap_or(cur);
            if next == first {
                break;
            }
            cur = next;
        }
        best
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::task::ThreadPool;

    fn noop() {}

    #[test]
    fn round_robin_over_equal_priority() {
        let mut pool = ThreadPool::new();
        let mut rq = RunQueue::new();
        let t1 = pool.create(noop, 100).unwrap();
        let t2 = pool.create(noop, 100).unwrap();
        let t3 = pool.create(noop, 100).unwrap();
        rq.insert(&mut pool, t1);
        rq.insert(&mut pool, t2);
        rq.insert(&mut pool, t3);

        // S4: from t1, four yields visit t2, t3, t1, t2.
        let mut current = Some(t1);
        let expect = [t2, t3, t1, t2];
        for want in expect {
            let picked = rq.highest_priority_ready(&pool, current).unwrap();
            assert_eq!(picked, want);
            current = Some(picked);
        }
    }

    #[test]
    fn removal_keeps_ring_consistent() {
        let mut pool = ThreadPool::new();
        let mut rq = RunQueue::new();
        let t1 = pool.create(noop, 100).unwrap();
        let t2 = pool.create(noop, 100).unwrap();
        rq.insert(&mut pool, t1);
        rq.insert(&mut pool, t2);
        rq.remove(&mut pool, t1);
        assert_eq!(rq.highest_priority_ready(&pool, None), Some(t2));
    }

    #[test]
    fn higher_priority_wins_over_round_robin_order() {
        let mut pool = ThreadPool::new();
        let mut rq = RunQueue::new();
        let low = pool.create(noop, 10).unwrap();
        let high = pool.create(noop, 200).unwrap();
        rq.insert(&mut pool, low);
        rq.insert(&mut pool, high);
        assert_eq!(rq.highest_priority_ready(&pool, None), Some(high));
    }
}
