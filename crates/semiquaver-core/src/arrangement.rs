//! Sequencer grid, arrangement snapshots, and the sequence source port

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemiquaverError};
use crate::note::{DrumHit, NoteEvent};
use crate::registry::DEFAULT_INSTRUMENT;

/// Fixed grid dimensions for an arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub bars: u32,
    pub beats_per_bar: u32,
    pub sixteenths_per_beat: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bars: 2,
            beats_per_bar: 4,
            sixteenths_per_beat: 4,
        }
    }
}

impl GridConfig {
    pub fn new(bars: u32, beats_per_bar: u32, sixteenths_per_beat: u32) -> Self {
        Self {
            bars,
            beats_per_bar,
            sixteenths_per_beat,
        }
    }

    pub fn total_ticks(&self) -> u64 {
        self.bars as u64 * self.ticks_per_bar()
    }

    pub fn ticks_per_bar(&self) -> u64 {
        self.beats_per_bar as u64 * self.sixteenths_per_beat as u64
    }

    /// Whether `tick` lands on a beat boundary
    pub fn is_beat(&self, tick: u64) -> bool {
        self.sixteenths_per_beat > 0 && tick % self.sixteenths_per_beat as u64 == 0
    }

    /// Whether `tick` lands on the first beat of a bar
    pub fn is_bar_start(&self, tick: u64) -> bool {
        let ticks_per_bar = self.ticks_per_bar();
        ticks_per_bar > 0 && tick % ticks_per_bar == 0
    }
}

/// All events on the grid, the unit the scheduler and renderer consume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub grid: GridConfig,
    /// Notes sorted by start_tick
    notes: Vec<NoteEvent>,
    /// Drum hits sorted by start_tick
    drums: Vec<DrumHit>,
}

impl Arrangement {
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            notes: Vec::new(),
            drums: Vec::new(),
        }
    }

    /// Add a note, keeping notes sorted by start_tick
    pub fn add_note(&mut self, note: NoteEvent) -> Result<()> {
        let total = self.grid.total_ticks();
        if note.start_tick >= total {
            return Err(SemiquaverError::TickOutOfRange {
                tick: note.start_tick,
                total,
            });
        }
        let idx = self
            .notes
            .iter()
            .position(|n| n.start_tick > note.start_tick)
            .unwrap_or(self.notes.len());
        self.notes.insert(idx, note);
        Ok(())
    }

    /// Add a drum hit, keeping hits sorted by start_tick
    pub fn add_drum(&mut self, hit: DrumHit) -> Result<()> {
        let total = self.grid.total_ticks();
        if hit.start_tick >= total {
            return Err(SemiquaverError::TickOutOfRange {
                tick: hit.start_tick,
                total,
            });
        }
        let idx = self
            .drums
            .iter()
            .position(|d| d.start_tick > hit.start_tick)
            .unwrap_or(self.drums.len());
        self.drums.insert(idx, hit);
        Ok(())
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn drums(&self) -> &[DrumHit] {
        &self.drums
    }

    pub fn notes_at(&self, tick: u64) -> impl Iterator<Item = &NoteEvent> {
        self.notes.iter().filter(move |n| n.start_tick == tick)
    }

    pub fn drums_at(&self, tick: u64) -> impl Iterator<Item = &DrumHit> {
        self.drums.iter().filter(move |d| d.start_tick == tick)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.drums.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.drums.clear();
    }
}

/// Where the scheduler pulls events from
///
/// A snapshot is taken when playback starts and again on every loop wrap,
/// so edits land at musically sensible boundaries instead of mid-pass.
pub trait SequenceSource: Send {
    /// Copy of the events for one pass
    fn snapshot(&self) -> Arrangement;
    fn grid(&self) -> GridConfig;
    /// Instrument id for pitched notes
    fn current_instrument(&self) -> String;
}

/// A fixed arrangement is its own source
impl SequenceSource for Arrangement {
    fn snapshot(&self) -> Arrangement {
        self.clone()
    }

    fn grid(&self) -> GridConfig {
        self.grid
    }

    fn current_instrument(&self) -> String {
        DEFAULT_INSTRUMENT.to_string()
    }
}

#[derive(Debug)]
struct SharedState {
    arrangement: Arrangement,
    instrument: String,
}

/// Live-editable sequence shared between a host and the scheduler
#[derive(Debug, Clone)]
pub struct SharedSequence {
    inner: Arc<Mutex<SharedState>>,
}

impl Default for SharedSequence {
    fn default() -> Self {
        Self::new(Arrangement::default())
    }
}

impl SharedSequence {
    pub fn new(arrangement: Arrangement) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedState {
                arrangement,
                instrument: DEFAULT_INSTRUMENT.to_string(),
            })),
        }
    }

    /// Mutate the arrangement under the lock
    pub fn edit<R>(&self, f: impl FnOnce(&mut Arrangement) -> R) -> Option<R> {
        self.inner.lock().ok().map(|mut state| f(&mut state.arrangement))
    }

    pub fn set_instrument(&self, id: impl Into<String>) {
        if let Ok(mut state) = self.inner.lock() {
            state.instrument = id.into();
        }
    }

    pub fn instrument(&self) -> String {
        self.inner
            .lock()
            .map(|state| state.instrument.clone())
            .unwrap_or_else(|_| DEFAULT_INSTRUMENT.to_string())
    }
}

impl SequenceSource for SharedSequence {
    fn snapshot(&self) -> Arrangement {
        self.inner
            .lock()
            .map(|state| state.arrangement.clone())
            .unwrap_or_default()
    }

    fn grid(&self) -> GridConfig {
        self.inner
            .lock()
            .map(|state| state.arrangement.grid)
            .unwrap_or_default()
    }

    fn current_instrument(&self) -> String {
        self.instrument()
    }
}
