//! Lookahead transport scheduler
//!
//! A wall-clock poll thread wakes every few milliseconds and dispatches
//! every grid tick whose onset falls inside a lookahead window on the
//! audio clock. Wall time only decides when to look; every onset handed to
//! the synth is an audio-clock time, so jitter in the poll cadence never
//! reaches the music. If the dispatch horizon falls behind the audio clock
//! it is re-anchored just ahead of now instead of skipping ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use semiquaver_core::{
    Arrangement, NoteEvent, PlaybackState, SequenceSource, Transport,
};
use tracing::{trace, warn};

use crate::clock::AudioClock;
use crate::error::Result;
use crate::synth::Synth;

/// How far ahead of the audio clock ticks are dispatched
pub(crate) const LOOKAHEAD_SECS: f64 = 0.1;
/// Poll cadence, several wakeups per lookahead window
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Margin used when anchoring the dispatch horizon to the clock
const EPSILON_SECS: f64 = 0.01;

type StateCallback = Box<dyn Fn(PlaybackState) + Send>;
type PositionCallback = Box<dyn Fn(f64) + Send>;

#[derive(Default)]
struct Callbacks {
    state: Option<StateCallback>,
    position: Option<PositionCallback>,
}

/// What one tick pass produced, delivered after the core lock is released
struct TickOutcome {
    state_change: Option<PlaybackState>,
    position: f64,
}

struct SchedulerCore {
    transport: Transport,
    /// Events for the current pass; refreshed on play-from-stop and wrap
    snapshot: Arrangement,
    source: Box<dyn SequenceSource>,
    /// Audio-clock onset of the next undispatched tick
    next_schedule_time: f64,
    last_scheduled_tick: Option<u64>,
    drift_count: u64,
}

impl SchedulerCore {
    fn tick(&mut self, now: f64, synth: &Synth) -> Option<TickOutcome> {
        if self.transport.state != PlaybackState::Playing {
            return None;
        }
        if self.next_schedule_time < now {
            self.drift_count += 1;
            warn!(
                behind_secs = now - self.next_schedule_time,
                drift_count = self.drift_count,
                "dispatch horizon fell behind the audio clock, re-anchoring"
            );
            self.next_schedule_time = now + EPSILON_SECS;
        }
        let mut state_change = None;
        while self.transport.is_playing() && self.next_schedule_time < now + LOOKAHEAD_SECS {
            let total_ticks = self.snapshot.grid.total_ticks();
            if total_ticks == 0 {
                self.transport.stop();
                state_change = Some(PlaybackState::Stopped);
                break;
            }
            let tick_index = self.transport.position.floor() as u64;
            if self.last_scheduled_tick != Some(tick_index) {
                self.dispatch(tick_index, synth);
                self.last_scheduled_tick = Some(tick_index);
            }
            self.next_schedule_time += self.transport.seconds_per_tick();
            // The final tick ends the pass right here; the playhead never
            // rests at total_ticks while playing
            if tick_index + 1 >= total_ticks {
                if self.transport.loop_enabled {
                    // The wrap picks up edits made during the pass
                    self.transport.position = 0.0;
                    self.snapshot = self.source.snapshot();
                    self.last_scheduled_tick = None;
                } else {
                    self.transport.stop();
                    state_change = Some(PlaybackState::Stopped);
                }
            } else {
                self.transport.position = (tick_index + 1) as f64;
            }
        }
        Some(TickOutcome {
            state_change,
            position: self.transport.position,
        })
    }

    fn dispatch(&self, tick: u64, synth: &Synth) {
        let at = Some(self.next_schedule_time);
        let spt = self.transport.seconds_per_tick();
        let instrument = self.source.current_instrument();
        for note in self.snapshot.notes_at(tick) {
            let duration = note.duration_ticks as f64 * spt;
            if let Err(err) = synth.play_note(&instrument, note.pitch, at, duration, note.velocity)
            {
                trace!(tick, error = %err, "note dispatch skipped");
            }
        }
        for hit in self.snapshot.drums_at(tick) {
            if let Err(err) = synth.play_drum(hit.drum, at, hit.velocity) {
                trace!(tick, error = %err, "drum dispatch skipped");
            }
        }
        if self.transport.metronome_enabled && self.snapshot.grid.is_beat(tick) {
            let accent = self.snapshot.grid.is_bar_start(tick);
            if let Err(err) = synth.play_metronome_click(at, accent) {
                trace!(tick, error = %err, "click dispatch skipped");
            }
        }
    }
}

/// Transport control over one sequence source
///
/// Owns the poll thread; pausing and stopping leave the thread parked on
/// its interval, and dropping the scheduler joins it.
pub struct TransportScheduler {
    core: Arc<Mutex<SchedulerCore>>,
    callbacks: Arc<Mutex<Callbacks>>,
    synth: Synth,
    clock: Arc<dyn AudioClock>,
    poll_running: Arc<AtomicBool>,
    poll_thread: Option<JoinHandle<()>>,
}

impl TransportScheduler {
    pub fn new(synth: Synth, source: Box<dyn SequenceSource>) -> Self {
        let snapshot = source.snapshot();
        let clock = synth.clock();
        Self {
            core: Arc::new(Mutex::new(SchedulerCore {
                transport: Transport::default(),
                snapshot,
                source,
                next_schedule_time: 0.0,
                last_scheduled_tick: None,
                drift_count: 0,
            })),
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            synth,
            clock,
            poll_running: Arc::new(AtomicBool::new(false)),
            poll_thread: None,
        }
    }

    /// Start or resume playback
    ///
    /// From stopped: rewinds to tick zero and takes a fresh snapshot.
    /// From paused: resumes at the frozen position. Playing is a no-op.
    pub fn play(&mut self) -> Result<()> {
        self.synth.ensure_active()?;
        let now = self.clock.now();
        let mut started = false;
        if let Ok(mut core) = self.core.lock() {
            match core.transport.state {
                PlaybackState::Playing => {}
                PlaybackState::Paused => {
                    core.transport.play();
                    core.next_schedule_time = now + EPSILON_SECS;
                    started = true;
                }
                PlaybackState::Stopped => {
                    core.transport.position = 0.0;
                    core.snapshot = core.source.snapshot();
                    core.last_scheduled_tick = None;
                    core.transport.play();
                    core.next_schedule_time = now + EPSILON_SECS;
                    started = true;
                }
            }
        }
        if !started {
            return Ok(());
        }
        self.ensure_poll_thread();
        self.run_tick();
        self.fire_state(PlaybackState::Playing);
        Ok(())
    }

    /// Freeze playback at the current position
    pub fn pause(&self) {
        let mut paused = false;
        if let Ok(mut core) = self.core.lock() {
            if core.transport.is_playing() {
                core.transport.pause();
                paused = true;
            }
        }
        if paused {
            self.fire_state(PlaybackState::Paused);
        }
    }

    /// Stop playback and rewind to tick zero
    pub fn stop(&self) {
        let mut stopped = false;
        if let Ok(mut core) = self.core.lock() {
            if core.transport.state != PlaybackState::Stopped {
                core.transport.stop();
                core.last_scheduled_tick = None;
                stopped = true;
            }
        }
        if stopped {
            self.fire_state(PlaybackState::Stopped);
            self.fire_position(0.0);
        }
    }

    /// Change tempo; already-dispatched onsets keep their times
    pub fn set_bpm(&self, bpm: f64) {
        if let Ok(mut core) = self.core.lock() {
            core.transport.set_bpm(bpm);
        }
    }

    pub fn bpm(&self) -> f64 {
        self.core
            .lock()
            .map(|core| core.transport.bpm())
            .unwrap_or(120.0)
    }

    /// Playhead in ticks
    pub fn position(&self) -> f64 {
        self.core
            .lock()
            .map(|core| core.transport.position)
            .unwrap_or(0.0)
    }

    /// Snapshot of the transport state
    pub fn transport(&self) -> Transport {
        self.core
            .lock()
            .map(|core| core.transport.clone())
            .unwrap_or_default()
    }

    pub fn toggle_loop(&self) -> bool {
        self.core
            .lock()
            .map(|mut core| {
                core.transport.loop_enabled = !core.transport.loop_enabled;
                core.transport.loop_enabled
            })
            .unwrap_or(false)
    }

    pub fn toggle_metronome(&self) -> bool {
        self.core
            .lock()
            .map(|mut core| {
                core.transport.metronome_enabled = !core.transport.metronome_enabled;
                core.transport.metronome_enabled
            })
            .unwrap_or(false)
    }

    pub fn toggle_record(&self) -> bool {
        self.core
            .lock()
            .map(|mut core| {
                core.transport.record_enabled = !core.transport.record_enabled;
                core.transport.record_enabled
            })
            .unwrap_or(false)
    }

    /// Insert a live-played note into the current pass at the playhead
    ///
    /// The note lands on the next undispatched tick, so it sounds on this
    /// pass. Returns false unless the transport is playing with record
    /// enabled and the note is valid for the grid.
    pub fn record_note(&self, pitch: u8, velocity: f32) -> bool {
        let Ok(mut core) = self.core.lock() else {
            return false;
        };
        if !core.transport.is_playing() || !core.transport.record_enabled {
            return false;
        }
        let tick = core.transport.position.floor() as u64;
        let Ok(note) = NoteEvent::new(pitch, tick, 1, velocity) else {
            return false;
        };
        core.snapshot.add_note(note).is_ok()
    }

    /// Times the dispatch horizon has been re-anchored after falling behind
    pub fn drift_count(&self) -> u64 {
        self.core
            .lock()
            .map(|core| core.drift_count)
            .unwrap_or(0)
    }

    /// Called with the new state on every transition
    pub fn on_state_change(&self, callback: impl Fn(PlaybackState) + Send + 'static) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.state = Some(Box::new(callback));
        }
    }

    /// Called with the playhead position, at most once per poll
    pub fn on_position(&self, callback: impl Fn(f64) + Send + 'static) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.position = Some(Box::new(callback));
        }
    }

    fn ensure_poll_thread(&mut self) {
        if self
            .poll_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let core = Arc::clone(&self.core);
        let callbacks = Arc::clone(&self.callbacks);
        let synth = self.synth.clone();
        let clock = Arc::clone(&self.clock);
        let running = Arc::clone(&self.poll_running);
        self.poll_thread = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                run_tick(&core, &callbacks, &synth, clock.as_ref());
                thread::sleep(POLL_INTERVAL);
            }
        }));
    }

    fn run_tick(&self) {
        run_tick(&self.core, &self.callbacks, &self.synth, self.clock.as_ref());
    }

    fn fire_state(&self, state: PlaybackState) {
        if let Ok(callbacks) = self.callbacks.lock() {
            if let Some(cb) = &callbacks.state {
                cb(state);
            }
        }
    }

    fn fire_position(&self, position: f64) {
        if let Ok(callbacks) = self.callbacks.lock() {
            if let Some(cb) = &callbacks.position {
                cb(position);
            }
        }
    }
}

impl Drop for TransportScheduler {
    fn drop(&mut self) {
        self.poll_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.poll_thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_tick(
    core: &Mutex<SchedulerCore>,
    callbacks: &Mutex<Callbacks>,
    synth: &Synth,
    clock: &dyn AudioClock,
) {
    let now = clock.now();
    let outcome = match core.lock() {
        Ok(mut core) => core.tick(now, synth),
        Err(_) => None,
    };
    let Some(outcome) = outcome else {
        return;
    };
    if let Ok(callbacks) = callbacks.lock() {
        if let Some(state) = outcome.state_change {
            if let Some(cb) = &callbacks.state {
                cb(state);
            }
        }
        if let Some(cb) = &callbacks.position {
            cb(outcome.position);
        }
    }
}
