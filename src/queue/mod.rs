//! Single-flight sequencing primitive
//!
//! A FIFO of pending units plus an explicit "current in-flight" marker.
//! Both the client operation sequencer and the server notification fan-out
//! are built on it:
//! - at most one unit is handed to the transport at a time
//! - units appended while one is in flight wait their turn
//! - units are resolved strictly in FIFO order
//!
//! The queue itself is not synchronized; owners keep it behind their single
//! per-instance lock and hand units to a [`worker`] for dispatch.

pub mod worker;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub(crate) use worker::{spawn_worker, Command, WorkerHandle};

/// A unit that can be sequenced
pub trait QueueUnit: Clone {
    type Id: Copy + Eq + fmt::Debug;

    fn unit_id(&self) -> Self::Id;
}

impl QueueUnit for crate::gatt::Operation {
    type Id = crate::gatt::OperationId;

    fn unit_id(&self) -> Self::Id {
        self.id
    }
}

impl QueueUnit for crate::gatt::NotificationItem {
    type Id = crate::gatt::ItemId;

    fn unit_id(&self) -> Self::Id {
        self.id
    }
}

/// Lifecycle of a sequencer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerPhase {
    /// Queue empty
    Idle,
    /// One unit in flight (or about to be handed to the transport)
    Dispatching,
    /// Disconnect/stop resolving every pending unit
    Flushing,
}

#[derive(Debug, Clone, Copy)]
struct InFlight<I> {
    id: I,
    /// Set once the worker has actually handed the unit to the transport
    handed_off: bool,
}

/// A resolved unit and, if the queue did not drain, the next one to dispatch
#[derive(Debug)]
pub struct Completed<U> {
    pub unit: U,
    pub next: Option<U>,
}

#[derive(Debug, Clone, Copy, Default)]
struct QueueCounters {
    dispatched: u64,
    completed: u64,
    failed: u64,
    flushed: u64,
    rejected: u64,
    dispatch_rejected: u64,
}

/// FIFO queue with a single in-flight head
pub struct SequencerQueue<U: QueueUnit> {
    pending: VecDeque<U>,
    in_flight: Option<InFlight<U::Id>>,
    phase: SequencerPhase,
    counters: QueueCounters,
}

impl<U: QueueUnit> SequencerQueue<U> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            phase: SequencerPhase::Idle,
            counters: QueueCounters::default(),
        }
    }

    /// Append a unit
    ///
    /// Returns the unit to dispatch when the queue was idle before this call.
    pub fn push(&mut self, unit: U) -> Option<U> {
        self.pending.push_back(unit);
        self.arm_head()
    }

    /// Append several units back to back
    ///
    /// Returns the first of them to dispatch when the queue was idle.
    pub fn extend(&mut self, units: impl IntoIterator<Item = U>) -> Option<U> {
        self.pending.extend(units);
        self.arm_head()
    }

    fn arm_head(&mut self) -> Option<U> {
        if self.in_flight.is_some() {
            return None;
        }
        let head = self.pending.front()?;
        self.in_flight = Some(InFlight {
            id: head.unit_id(),
            handed_off: false,
        });
        self.phase = SequencerPhase::Dispatching;
        Some(head.clone())
    }

    /// Grant the worker permission to hand `id` to the transport
    ///
    /// Fails when the unit was flushed (or already handed off) since it was
    /// scheduled, in which case the transport must not be contacted.
    pub fn claim(&mut self, id: U::Id) -> bool {
        match self.in_flight.as_mut() {
            Some(flight) if flight.id == id && !flight.handed_off => {
                flight.handed_off = true;
                self.counters.dispatched += 1;
                true
            }
            _ => false,
        }
    }

    /// The unit currently at the transport, if any
    pub fn current(&self) -> Option<&U> {
        match self.in_flight {
            Some(InFlight {
                handed_off: true, ..
            }) => self.pending.front(),
            _ => None,
        }
    }

    /// Resolve whatever unit is at the transport
    ///
    /// `None` means the completion is stale: nothing has been handed off.
    pub fn complete_current(&mut self, success: bool) -> Option<Completed<U>> {
        match self.in_flight {
            Some(InFlight {
                handed_off: true, ..
            }) => {}
            _ => return None,
        }
        self.in_flight = None;
        let unit = self.pending.pop_front()?;
        if success {
            self.counters.completed += 1;
        } else {
            self.counters.failed += 1;
        }
        let next = self.arm_head();
        if next.is_none() {
            self.phase = SequencerPhase::Idle;
        }
        Some(Completed { unit, next })
    }

    /// Resolve the unit `id`, only if it is the one at the transport
    pub fn complete(&mut self, id: U::Id, success: bool) -> Option<Completed<U>> {
        match self.in_flight {
            Some(flight) if flight.id == id => self.complete_current(success),
            _ => None,
        }
    }

    /// Enter `Flushing` and take every pending unit, in FIFO order
    ///
    /// The caller resolves them and then calls [`Self::end_flush`] without
    /// releasing its lock in between.
    pub fn begin_flush(&mut self) -> Vec<U> {
        self.phase = SequencerPhase::Flushing;
        self.in_flight = None;
        let drained: Vec<U> = self.pending.drain(..).collect();
        self.counters.flushed += drained.len() as u64;
        drained
    }

    pub fn end_flush(&mut self) {
        self.phase = SequencerPhase::Idle;
    }

    /// Count a unit resolved as failed without ever entering the queue
    pub fn record_rejected(&mut self) {
        self.counters.rejected += 1;
    }

    /// Count a handed-off unit the transport refused to start
    pub fn record_dispatch_rejected(&mut self) {
        self.counters.dispatch_rejected += 1;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn phase(&self) -> SequencerPhase {
        self.phase
    }

    pub fn metrics(&self) -> SequencerMetrics {
        SequencerMetrics {
            phase: self.phase,
            pending: self.pending.len(),
            open_batches: 0,
            dispatched_total: self.counters.dispatched,
            completed_total: self.counters.completed,
            failed_total: self.counters.failed,
            flushed_total: self.counters.flushed,
            rejected_total: self.counters.rejected,
            dispatch_rejected_total: self.counters.dispatch_rejected,
        }
    }
}

impl<U: QueueUnit> Default for SequencerQueue<U> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequencer metrics for monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerMetrics {
    pub phase: SequencerPhase,
    /// Units queued, including the in-flight one
    pub pending: usize,
    /// Notification batches not yet reported (always 0 for the client)
    pub open_batches: usize,
    pub dispatched_total: u64,
    pub completed_total: u64,
    pub failed_total: u64,
    pub flushed_total: u64,
    pub rejected_total: u64,
    /// Units whose `begin_*` call was refused or panicked
    pub dispatch_rejected_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Unit(u32);

    impl QueueUnit for Unit {
        type Id = u32;

        fn unit_id(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_queue_creation() {
        let queue: SequencerQueue<Unit> = SequencerQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.phase(), SequencerPhase::Idle);
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_only_first_push_dispatches() {
        let mut queue = SequencerQueue::new();
        assert_eq!(queue.push(Unit(1)), Some(Unit(1)));
        assert_eq!(queue.push(Unit(2)), None);
        assert_eq!(queue.push(Unit(3)), None);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.phase(), SequencerPhase::Dispatching);
    }

    #[test]
    fn test_completion_requires_hand_off() {
        let mut queue = SequencerQueue::new();
        queue.push(Unit(1));

        // Scheduled but not yet at the transport
        assert!(queue.current().is_none());
        assert!(queue.complete_current(true).is_none());

        assert!(queue.claim(1));
        assert!(!queue.claim(1));
        assert_eq!(queue.current(), Some(&Unit(1)));
    }

    #[test]
    fn test_complete_chains_to_next() {
        let mut queue = SequencerQueue::new();
        queue.push(Unit(1));
        queue.push(Unit(2));
        queue.claim(1);

        let done = queue.complete_current(true).unwrap();
        assert_eq!(done.unit, Unit(1));
        assert_eq!(done.next, Some(Unit(2)));
        assert_eq!(queue.phase(), SequencerPhase::Dispatching);

        queue.claim(2);
        let done = queue.complete_current(false).unwrap();
        assert_eq!(done.unit, Unit(2));
        assert!(done.next.is_none());
        assert_eq!(queue.phase(), SequencerPhase::Idle);

        let metrics = queue.metrics();
        assert_eq!(metrics.dispatched_total, 2);
        assert_eq!(metrics.completed_total, 1);
        assert_eq!(metrics.failed_total, 1);
    }

    #[test]
    fn test_complete_by_id_ignores_other_ids() {
        let mut queue = SequencerQueue::new();
        queue.push(Unit(1));
        queue.claim(1);

        assert!(queue.complete(7, true).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.complete(1, true).is_some());
    }

    #[test]
    fn test_flush_drains_in_order_and_blocks_stale_claims() {
        let mut queue = SequencerQueue::new();
        queue.extend(vec![Unit(1), Unit(2), Unit(3)]);
        queue.claim(1);

        let drained = queue.begin_flush();
        assert_eq!(queue.phase(), SequencerPhase::Flushing);
        queue.end_flush();

        assert_eq!(drained, vec![Unit(1), Unit(2), Unit(3)]);
        assert!(queue.is_empty());
        assert_eq!(queue.phase(), SequencerPhase::Idle);
        assert!(queue.complete_current(true).is_none());
        assert!(!queue.claim(2));
        assert_eq!(queue.metrics().flushed_total, 3);
    }

    #[test]
    fn test_flush_when_idle_is_noop() {
        let mut queue: SequencerQueue<Unit> = SequencerQueue::new();
        assert!(queue.begin_flush().is_empty());
        queue.end_flush();
        assert_eq!(queue.metrics().flushed_total, 0);
    }

    #[test]
    fn test_extend_into_busy_queue() {
        let mut queue = SequencerQueue::new();
        assert_eq!(queue.extend(vec![Unit(1), Unit(2)]), Some(Unit(1)));
        assert_eq!(queue.extend(vec![Unit(3)]), None);
        assert_eq!(queue.len(), 3);
    }
}
