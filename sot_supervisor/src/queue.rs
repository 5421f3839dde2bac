//! Buffered external trajectory feed.
//!
//! Named channels accumulate timestamped samples continuously (push-only,
//! unbounded until drained). A replay cursor — an absolute cycle time —
//! gates when buffered samples become visible downstream: consumers see an
//! empty stream until the cursor is set and only samples at or after it.
//!
//! The minimum-fill wait in `wait_min_fill` blocks on a condition variable
//! signaled by every push. It runs on the supervisory context only — never
//! on the real-time cycle, whose queue reads (`read_up_to`) are a bounded
//! drain under a briefly held, normally uncontended lock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use sot_common::CycleTime;
use sot_common::consts::NOT_REPLAYING;

/// One timestamped sample on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Cycle time this sample refers to.
    pub time: CycleTime,
    /// Sample payload (position/orientation reference, etc.).
    pub value: Vec<f64>,
}

#[derive(Default)]
struct ChannelBuf {
    samples: VecDeque<Sample>,
}

/// Buffered, replay-gated input queue over named channels.
pub struct InputQueueSynchronizer {
    channels: Mutex<HashMap<String, ChannelBuf>>,
    filled: Condvar,
    /// Absolute cycle time from which samples are visible; `NOT_REPLAYING`
    /// while stopped.
    cursor: AtomicI64,
}

impl InputQueueSynchronizer {
    /// Create an empty, non-replaying queue.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            filled: Condvar::new(),
            cursor: AtomicI64::new(NOT_REPLAYING),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChannelBuf>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample to `channel`, creating the channel on first push.
    ///
    /// Wakes any supervisory caller blocked on a minimum-fill wait.
    pub fn push(&self, channel: &str, time: CycleTime, value: Vec<f64>) {
        {
            let mut channels = self.lock();
            channels
                .entry(channel.to_string())
                .or_default()
                .samples
                .push_back(Sample { time, value });
        }
        self.filled.notify_all();
    }

    /// Buffered sample count on `channel` (0 for unknown channels).
    pub fn queue_size(&self, channel: &str) -> usize {
        self.lock()
            .get(channel)
            .map_or(0, |buf| buf.samples.len())
    }

    /// Per-channel fill levels, for diagnostics.
    pub fn queue_sizes(&self) -> Vec<(String, usize)> {
        self.lock()
            .iter()
            .map(|(name, buf)| (name.clone(), buf.samples.len()))
            .collect()
    }

    /// Block until `channel` holds at least `min` samples.
    ///
    /// Returns immediately if already filled. If the source never produces
    /// `min` samples, this call never returns — callers must bound `min`
    /// against the known trajectory length.
    pub fn wait_min_fill(&self, channel: &str, min: usize) {
        let mut channels = self.lock();
        while channels.get(channel).map_or(0, |b| b.samples.len()) < min {
            channels = self
                .filled
                .wait(channels)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Make buffered samples visible from cycle time `start` on.
    pub fn start_replay_at(&self, start: CycleTime) {
        self.cursor.store(start, Ordering::Release);
    }

    /// Stop replay: downstream consumers see an empty stream again.
    ///
    /// Only affects future reads; an in-flight minimum-fill wait is not
    /// interrupted.
    pub fn stop_replay(&self) {
        self.cursor.store(NOT_REPLAYING, Ordering::Release);
    }

    /// The replay cursor, if replaying.
    pub fn replay_start(&self) -> Option<CycleTime> {
        match self.cursor.load(Ordering::Acquire) {
            NOT_REPLAYING => None,
            start => Some(start),
        }
    }

    /// Advance `channel` up to cycle time `now`, returning the latest sample
    /// that became visible.
    ///
    /// Returns `None` while not replaying, before the replay cursor, or when
    /// no buffered sample has `time <= now`. Samples superseded within the
    /// same advance are discarded.
    pub fn read_up_to(&self, channel: &str, now: CycleTime) -> Option<Sample> {
        let start = self.cursor.load(Ordering::Acquire);
        if start == NOT_REPLAYING || now < start {
            return None;
        }
        let mut channels = self.lock();
        let buf = channels.get_mut(channel)?;
        let mut latest = None;
        while buf
            .samples
            .front()
            .is_some_and(|sample| sample.time <= now)
        {
            latest = buf.samples.pop_front();
        }
        latest
    }

    /// Discard all buffered samples on one channel.
    pub fn clear_channel(&self, channel: &str) {
        if let Some(buf) = self.lock().get_mut(channel) {
            buf.samples.clear();
        }
    }

    /// Stop replay and discard all buffered samples on every channel.
    pub fn clear(&self) {
        self.stop_replay();
        let mut channels = self.lock();
        for buf in channels.values_mut() {
            buf.samples.clear();
        }
    }
}

impl Default for InputQueueSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}
