//! # Tube Series Buffer
//!
//! Bounded in-memory history backing the live charts.
//!
//! The buffer keeps one shared timeline (one timestamp per tick) plus one
//! sample ring per tube. Every ring is capped at the configured number of data
//! points; pushing past the cap drops the oldest element. A tube whose sensor
//! faulted on a tick simply has no sample for that tick, so a ring can be
//! shorter than the timeline.

use chrono::NaiveDateTime;
use std::collections::VecDeque;

use super::sample::{Sample, TubeId};

/// Per-tube rolling windows of samples
#[derive(Debug, Clone)]
pub struct TubeSeriesBuffer {
    capacity: usize,
    timeline: VecDeque<NaiveDateTime>,
    tubes: Vec<VecDeque<Sample>>,
}

impl TubeSeriesBuffer {
    /// Create empty rings for tubes `1..=tube_count`
    ///
    /// A capacity of zero is treated as one.
    pub fn new(tube_count: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            timeline: VecDeque::with_capacity(capacity),
            tubes: (0..tube_count).map(|_| VecDeque::with_capacity(capacity)).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tube_count(&self) -> usize {
        self.tubes.len()
    }

    /// Advance the shared timeline by one tick
    pub fn push_timestamp(&mut self, timestamp: NaiveDateTime) {
        push_bounded(&mut self.timeline, timestamp, self.capacity);
    }

    /// Append a sample to a tube's ring, dropping the oldest one when full
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    pub fn push(&mut self, tube: TubeId, sample: Sample) {
        let capacity = self.capacity;
        push_bounded(self.slot_mut(tube), sample, capacity);
    }

    /// Change the capacity of every ring
    ///
    /// Shrinking keeps the most recent samples. Growing keeps everything as is
    /// and does not backfill.
    pub fn resize(&mut self, new_capacity: usize) {
        self.capacity = new_capacity.max(1);
        truncate_front(&mut self.timeline, self.capacity);
        for ring in &mut self.tubes {
            truncate_front(ring, self.capacity);
        }
    }

    /// Empty a tube's ring
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    pub fn clear(&mut self, tube: TubeId) {
        self.slot_mut(tube).clear();
    }

    /// Replace a tube's ring with zero-valued samples, one per timeline entry
    ///
    /// Keeps a tube that joins late aligned with the others on the chart axes.
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    pub fn seed_zeroed(&mut self, tube: TubeId) {
        let seeded: VecDeque<Sample> = self.timeline.iter().copied().map(Sample::zeroed).collect();
        *self.slot_mut(tube) = seeded;
    }

    /// Shared tick timestamps, oldest first
    pub fn timeline(&self) -> &VecDeque<NaiveDateTime> {
        &self.timeline
    }

    /// A tube's samples, oldest first
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    pub fn samples(&self, tube: TubeId) -> &VecDeque<Sample> {
        &self.tubes[self.index(tube)]
    }

    /// A tube's pH values, oldest first
    pub fn ph_series(&self, tube: TubeId) -> Vec<f64> {
        self.samples(tube).iter().map(|s| s.ph).collect()
    }

    /// A tube's temperatures, oldest first
    pub fn temperature_series(&self, tube: TubeId) -> Vec<f64> {
        self.samples(tube).iter().map(|s| s.temperature).collect()
    }

    fn slot_mut(&mut self, tube: TubeId) -> &mut VecDeque<Sample> {
        let index = self.index(tube);
        &mut self.tubes[index]
    }

    fn index(&self, tube: TubeId) -> usize {
        let count = self.tubes.len();
        assert!(
            tube >= 1 && usize::from(tube) <= count,
            "tube {} out of range 1..={}",
            tube,
            count
        );
        usize::from(tube) - 1
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, capacity: usize) {
    ring.push_back(item);
    truncate_front(ring, capacity);
}

fn truncate_front<T>(ring: &mut VecDeque<T>, capacity: usize) {
    if ring.len() > capacity {
        let excess = ring.len() - capacity;
        ring.drain(..excess);
    }
}
