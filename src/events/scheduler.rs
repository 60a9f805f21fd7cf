// src/events/scheduler.rs

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::info;

use crate::core::SchedulerFull;
use crate::core::timestamp::{format_hms_millis, utc_now};

use super::event::Event;

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub seq: u64,
    pub process_time: DateTime<Utc>,
    pub event: Event,
}

// Ordnung nur über (process_time, seq); das Event selbst zählt nicht
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.process_time
            .cmp(&other.process_time)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
    next_seq: u64,
}

/// Delay queue: an event becomes ready at `timestamp + process_delay`, so the
/// segment covering its window has time to land on disk.
pub struct EventScheduler {
    process_delay: TimeDelta,
    max_pending: Option<usize>,
    queue: Mutex<Queue>,
}

impl EventScheduler {
    pub fn new(process_delay: Duration) -> Self {
        Self {
            process_delay: TimeDelta::from_std(process_delay).unwrap_or(TimeDelta::zero()),
            max_pending: None,
            queue: Mutex::new(Queue::default()),
        }
    }

    /// Limits how many events may wait at once (see [`Self::try_add_event`]).
    pub fn with_capacity_limit(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    pub fn process_delay(&self) -> TimeDelta {
        self.process_delay
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        // Heap bleibt auch nach Panic eines Halters konsistent
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Admits an event regardless of the capacity limit; returns its sequence id.
    pub fn add_event(&self, event: Event) -> u64 {
        let mut q = self.lock();
        self.push(&mut q, event)
    }

    pub fn try_add_event(&self, event: Event) -> Result<u64, SchedulerFull> {
        let mut q = self.lock();
        if let Some(max) = self.max_pending {
            if q.heap.len() >= max {
                return Err(SchedulerFull {
                    pending: q.heap.len(),
                });
            }
        }
        Ok(self.push(&mut q, event))
    }

    fn push(&self, q: &mut Queue, event: Event) -> u64 {
        q.next_seq += 1;
        let seq = q.next_seq;
        let process_time = event.timestamp + self.process_delay;

        info!(
            "[scheduler] event #{} {} @ {} → due {}",
            seq,
            event.camera,
            format_hms_millis(event.timestamp),
            format_hms_millis(process_time)
        );

        q.heap.push(Reverse(ScheduledEvent {
            seq,
            process_time,
            event,
        }));
        seq
    }

    pub fn get_ready_events(&self) -> Vec<ScheduledEvent> {
        self.get_ready_events_at(utc_now())
    }

    /// Pops every event due at `now`, earliest first, ties in admission order.
    pub fn get_ready_events_at(&self, now: DateTime<Utc>) -> Vec<ScheduledEvent> {
        let mut q = self.lock();
        let mut ready = Vec::new();
        while q
            .heap
            .peek()
            .is_some_and(|Reverse(next)| next.process_time <= now)
        {
            if let Some(Reverse(ev)) = q.heap.pop() {
                ready.push(ev);
            }
        }
        ready
    }

    pub fn pending_count(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock().heap.peek().map(|Reverse(next)| next.process_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_740_830_400 + secs, 0).unwrap()
    }

    fn ev(name: &str, secs: i64) -> Event {
        Event::new("motion", name, at(secs))
    }

    #[test]
    fn released_by_process_time_not_admission() {
        let s = EventScheduler::new(Duration::from_secs(5));
        s.add_event(ev("E1", 10));
        s.add_event(ev("E2", 8));

        assert!(s.get_ready_events_at(at(12)).is_empty());

        let ready = s.get_ready_events_at(at(15));
        let names: Vec<_> = ready.iter().map(|r| r.event.camera.as_str()).collect();
        assert_eq!(names, ["E2", "E1"]);
        assert_eq!(ready[0].process_time, at(13));
        assert_eq!(ready[1].process_time, at(15));
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn only_due_events_are_popped() {
        let s = EventScheduler::new(Duration::from_secs(5));
        s.add_event(ev("E1", 10));
        s.add_event(ev("E2", 8));

        let ready = s.get_ready_events_at(at(13));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].event.camera, "E2");
        assert_eq!(s.pending_count(), 1);
        assert_eq!(s.next_due(), Some(at(15)));
    }

    #[test]
    fn equal_process_times_keep_admission_order() {
        let s = EventScheduler::new(Duration::from_secs(1));
        for name in ["a", "b", "c", "d"] {
            s.add_event(ev(name, 0));
        }
        let ready = s.get_ready_events_at(at(1));
        let names: Vec<_> = ready.iter().map(|r| r.event.camera.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        let seqs: Vec<_> = ready.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, [1, 2, 3, 4]);
    }

    #[test]
    fn capacity_limit_refuses_new_events() {
        let s = EventScheduler::new(Duration::from_secs(30)).with_capacity_limit(2);
        assert!(s.try_add_event(ev("a", 0)).is_ok());
        assert!(s.try_add_event(ev("b", 0)).is_ok());
        assert_eq!(s.try_add_event(ev("c", 0)), Err(SchedulerFull { pending: 2 }));

        s.get_ready_events_at(at(60));
        assert!(s.try_add_event(ev("c", 0)).is_ok());
    }

    #[test]
    fn sequence_ids_are_per_instance() {
        let a = EventScheduler::new(Duration::ZERO);
        let b = EventScheduler::new(Duration::ZERO);
        assert_eq!(a.add_event(ev("x", 0)), 1);
        assert_eq!(a.add_event(ev("x", 0)), 2);
        assert_eq!(b.add_event(ev("x", 0)), 1);
    }
}
