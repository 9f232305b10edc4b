// src/sched.rs
//
// Virtual-time event scheduler.
// ----------------------------------------------------------------
// Single-threaded and cooperative: every logical process in the simulator
// (transaction generation, message delivery, a PoW suspension) is a chain of
// events on one priority queue. Suspending for `d` seconds means scheduling
// the continuation at `now + d`; spawning means scheduling at `now`. Events
// that share a virtual instant run in insertion order.
//

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::transaction::{PeerId, Transaction};

/// A point on the simulation clock, in virtual seconds.
///
/// Wraps `f64` with a total order so it can key the event queue. All values
/// produced by the scheduler are finite and non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn from_secs(secs: f64) -> Self {
        SimTime(secs)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// The instant `delay` seconds after this one.
    pub fn after(&self, delay: f64) -> Self {
        SimTime(self.0 + delay)
    }
}

impl Eq for SimTime {}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything that can happen in the simulated world.
#[derive(Debug, Clone)]
pub enum Event {
    /// Wake a peer to mint a transaction and re-arm its generator.
    TxTick { peer: PeerId },
    /// A transaction crossing a link arrives at `to`.
    TxDeliver {
        from: PeerId,
        to: PeerId,
        tx: Arc<Transaction>,
    },
    /// Begin (or retry) a mining attempt on the peer's current tip.
    MineStart { peer: PeerId },
    /// A PoW suspension expired; the candidate was sealed when the attempt
    /// started and still references the tip it was built on.
    MineDone {
        miner: PeerId,
        candidate: Arc<Block>,
    },
    /// A block crossing a link arrives at `to`.
    BlockDeliver {
        from: PeerId,
        to: PeerId,
        block: Arc<Block>,
    },
}

struct Entry {
    at: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // seq breaks ties so simultaneous events pop in insertion order
        self.at.cmp(&other.at).then_with(|| self.seq.cmp(&other.seq))
    }
}

/// The virtual-time priority queue.
#[derive(Default)]
pub struct Scheduler {
    now: SimTime,
    seq: u64,
    queue: BinaryHeap<Reverse<Entry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Suspend the logical process behind `event` for `delay` seconds.
    pub fn schedule_in(&mut self, delay: f64, event: Event) {
        let at = self.now.after(delay.max(0.0));
        self.push(at, event);
    }

    /// Enroll `event` at the current instant (after everything already
    /// scheduled for it).
    pub fn schedule_now(&mut self, event: Event) {
        self.push(self.now, event);
    }

    fn push(&mut self, at: SimTime, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(Entry { at, seq, event }));
    }

    /// Pop the next event at or before `horizon`, advancing the clock to its
    /// instant. Returns `None` once the queue is drained or only events past
    /// the horizon remain (the clock then rests at the horizon).
    pub fn pop_due(&mut self, horizon: SimTime) -> Option<Event> {
        let due = match self.queue.peek() {
            Some(Reverse(entry)) => entry.at <= horizon,
            None => return None,
        };
        if !due {
            self.now = horizon;
            return None;
        }
        let Reverse(entry) = self.queue.pop().expect("peeked entry still queued");
        self.now = entry.at;
        Some(entry.event)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tick(peer: PeerId) -> Event {
        Event::TxTick { peer }
    }

    fn peer_of(event: Event) -> PeerId {
        match event {
            Event::TxTick { peer } => peer,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn pops_in_time_order() {
        let mut sched = Scheduler::new();
        sched.schedule_in(3.0, tick(3));
        sched.schedule_in(1.0, tick(1));
        sched.schedule_in(2.0, tick(2));

        let horizon = SimTime::from_secs(10.0);
        assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), 1);
        assert_eq!(sched.now(), SimTime::from_secs(1.0));
        assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), 2);
        assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), 3);
        assert!(sched.pop_due(horizon).is_none());
    }

    #[test]
    fn same_instant_runs_in_insertion_order() {
        let mut sched = Scheduler::new();
        for peer in 0..8 {
            sched.schedule_in(5.0, tick(peer));
        }
        let horizon = SimTime::from_secs(10.0);
        for expected in 0..8 {
            assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), expected);
        }
    }

    #[test]
    fn horizon_stops_the_clock() {
        let mut sched = Scheduler::new();
        sched.schedule_in(2.0, tick(0));
        sched.schedule_in(50.0, tick(1));

        let horizon = SimTime::from_secs(10.0);
        assert!(sched.pop_due(horizon).is_some());
        assert!(sched.pop_due(horizon).is_none());
        assert_eq!(sched.now(), horizon);
        // the late event stays queued
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn spawn_runs_after_pending_work_at_same_instant() {
        let mut sched = Scheduler::new();
        sched.schedule_in(0.0, tick(0));
        sched.schedule_now(tick(1));
        let horizon = SimTime::from_secs(1.0);
        assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), 0);
        assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), 1);
    }

    #[test]
    fn negative_delays_clamp_to_now() {
        let mut sched = Scheduler::new();
        sched.schedule_in(5.0, tick(0));
        let horizon = SimTime::from_secs(10.0);
        sched.pop_due(horizon);
        sched.schedule_in(-3.0, tick(1));
        assert_eq!(peer_of(sched.pop_due(horizon).unwrap()), 1);
        assert_eq!(sched.now(), SimTime::from_secs(5.0));
    }

    proptest! {
        /// The clock never rewinds, whatever the schedule looks like.
        #[test]
        fn clock_is_monotone(delays in proptest::collection::vec(0.0f64..100.0, 1..40)) {
            let mut sched = Scheduler::new();
            for (peer, d) in delays.iter().enumerate() {
                sched.schedule_in(*d, tick(peer));
            }
            let horizon = SimTime::from_secs(1000.0);
            let mut last = SimTime::ZERO;
            while let Some(_) = sched.pop_due(horizon) {
                prop_assert!(sched.now() >= last);
                last = sched.now();
            }
        }

        /// Events that land on the same instant pop in insertion order.
        #[test]
        fn stable_at_equal_instants(groups in proptest::collection::vec(0u8..4, 2..30)) {
            let mut sched = Scheduler::new();
            for (i, g) in groups.iter().enumerate() {
                sched.schedule_in(*g as f64, tick(i));
            }
            let horizon = SimTime::from_secs(100.0);
            let mut seen: Vec<(SimTime, PeerId)> = Vec::new();
            while let Some(ev) = sched.pop_due(horizon) {
                seen.push((sched.now(), peer_of(ev)));
            }
            for pair in seen.windows(2) {
                if pair[0].0 == pair[1].0 {
                    prop_assert!(pair[0].1 < pair[1].1);
                }
            }
        }
    }
}
