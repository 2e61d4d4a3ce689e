//! Collaborator seams: where values come from and where lamp levels go.
//!
//! The panel core never talks to hardware or a simulator directly. It reads
//! values through [`ValueSource`], asks [`EnvironmentMonitor`] whether the
//! upstream environment is running, and writes lamp levels to an
//! [`OutputSink`]. In-memory implementations live here too so test code and
//! the demo driver can run without any hardware attached.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const MAX_LABEL_LEN: usize = 32;

pub type Label = ArrayString<MAX_LABEL_LEN>;

/// Build a label, truncating at a char boundary if `text` is too long.
pub fn make_label(text: &str) -> Label {
    let mut label = Label::new();
    for ch in text.chars() {
        if label.try_push(ch).is_err() {
            break;
        }
    }
    label
}

/// Identifier of an upstream monitored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u16);

/// Identifier of a physical output channel (e.g. a pin driving a lamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u16);

pub trait ValueSource {
    /// Current value of `source`. Must not fail; on disconnect the
    /// implementation supplies a last-known or default value.
    fn read_value(&mut self, source: SourceId) -> f64;
}

impl<F> ValueSource for F
where
    F: FnMut(SourceId) -> f64,
{
    fn read_value(&mut self, source: SourceId) -> f64 {
        self(source)
    }
}

pub trait EnvironmentMonitor {
    fn is_environment_active(&self) -> bool;
}

impl EnvironmentMonitor for bool {
    fn is_environment_active(&self) -> bool {
        *self
    }
}

pub trait OutputSink {
    fn write_output(&mut self, channel: ChannelId, level: bool);
}

/// Sink that discards every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_output(&mut self, _channel: ChannelId, _level: bool) {}
}

/// Table-backed value source. Unknown sources read as `default_value`.
#[derive(Debug, Clone)]
pub struct MapSource {
    values: HashMap<SourceId, f64>,
    default_value: f64,
    reads: u64,
}

impl MapSource {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            default_value: 0.0,
            reads: 0,
        }
    }

    pub fn with_default(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn set(&mut self, source: SourceId, value: f64) {
        self.values.insert(source, value);
    }

    /// Total number of reads served, for checking the once-per-cycle contract.
    pub fn read_count(&self) -> u64 {
        self.reads
    }
}

impl Default for MapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueSource for MapSource {
    fn read_value(&mut self, source: SourceId) -> f64 {
        self.reads += 1;
        self.values.get(&source).copied().unwrap_or(self.default_value)
    }
}

/// Sink that remembers every write and the latest level per channel.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    writes: Vec<(ChannelId, bool)>,
    levels: HashMap<ChannelId, bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, channel: ChannelId) -> Option<bool> {
        self.levels.get(&channel).copied()
    }

    pub fn writes(&self) -> &[(ChannelId, bool)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl OutputSink for RecordingSink {
    fn write_output(&mut self, channel: ChannelId, level: bool) {
        self.writes.push((channel, level));
        self.levels.insert(channel, level);
    }
}

/// One synthetic signal: a triangle wave between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub source: SourceId,
    pub min: f64,
    pub max: f64,
    pub period_ms: u32,
}

impl Sweep {
    pub fn value_at(&self, now_ms: u64) -> f64 {
        if self.period_ms == 0 {
            return self.min;
        }
        let period = u64::from(self.period_ms);
        let phase = (now_ms % period) as f64 / period as f64;
        let fraction = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
        self.min + (self.max - self.min) * fraction
    }
}

/// Synthetic value source for running a panel without a simulator.
///
/// Sources with a [`Sweep`] follow it; values set with
/// [`SweepSource::hold`] override the sweep until released.
#[derive(Debug, Clone)]
pub struct SweepSource {
    sweeps: Vec<Sweep>,
    held: HashMap<SourceId, f64>,
    now_ms: u64,
}

impl SweepSource {
    pub fn new(sweeps: Vec<Sweep>) -> Self {
        Self {
            sweeps,
            held: HashMap::new(),
            now_ms: 0,
        }
    }

    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn hold(&mut self, source: SourceId, value: f64) {
        self.held.insert(source, value);
    }

    pub fn release(&mut self, source: SourceId) {
        self.held.remove(&source);
    }
}

impl ValueSource for SweepSource {
    fn read_value(&mut self, source: SourceId) -> f64 {
        if let Some(value) = self.held.get(&source) {
            return *value;
        }
        self.sweeps
            .iter()
            .find(|sweep| sweep.source == source)
            .map_or(0.0, |sweep| sweep.value_at(self.now_ms))
    }
}
