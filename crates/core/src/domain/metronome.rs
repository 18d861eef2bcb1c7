//! Lookahead metronome scheduler
//!
//! Clicks are stamped in the audio engine's own clock, not wall-clock time.
//! A coarse timer calls [`MetronomeScheduler::tick`] (every 25 ms by
//! default); each tick schedules every click falling inside a short
//! lookahead window, so timer jitter never reaches the audio.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Lowest accepted tempo
pub const MIN_BPM: f64 = 30.0;
/// Highest accepted tempo
pub const MAX_BPM: f64 = 250.0;

/// Oscillator frequency of accented clicks (Hz)
pub const ACCENT_FREQUENCY: f64 = 880.0;
/// Oscillator frequency of regular clicks (Hz)
pub const CLICK_FREQUENCY: f64 = 440.0;
/// Length of one click burst in seconds
pub const CLICK_DURATION: f64 = 0.03;

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub bpm: f64,
    /// How far ahead of the engine clock clicks are scheduled
    pub lookahead_secs: f64,
    /// Period of the driving timer
    pub tick_interval_ms: u64,
    /// Clicks per beat (4 = sixteenth notes)
    pub subdivisions_per_beat: u32,
    /// Every n-th subdivision is accented
    pub accent_interval: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            lookahead_secs: 0.1,
            tick_interval_ms: 25,
            subdivisions_per_beat: 4,
            accent_interval: 16,
        }
    }
}

/// One precisely time-stamped click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    /// Start time in engine seconds
    pub time: f64,
    /// Position within the accent cycle
    pub subdivision: u32,
    pub accent: bool,
    pub frequency: f64,
    pub duration: f64,
}

/// Source of engine time. `None` when the engine is not running.
pub trait AudioClock {
    fn current_time(&self) -> Option<f64>;
}

/// Receiver of scheduled clicks
pub trait ClickSink {
    fn schedule(&self, event: ClickEvent);
}

impl<T: AudioClock + ?Sized> AudioClock for &T {
    fn current_time(&self) -> Option<f64> {
        (**self).current_time()
    }
}

impl<T: ClickSink + ?Sized> ClickSink for &T {
    fn schedule(&self, event: ClickEvent) {
        (**self).schedule(event)
    }
}

/// Lookahead click scheduler
pub struct MetronomeScheduler<C> {
    clock: C,
    config: MetronomeConfig,
    running: bool,
    next_event_time: f64,
    current_subdivision: u32,
}

impl<C: AudioClock + ClickSink> MetronomeScheduler<C> {
    pub fn new(clock: C, mut config: MetronomeConfig) -> Self {
        if !config.bpm.is_finite() {
            warn!("Invalid tempo {}, using the default", config.bpm);
            config.bpm = MetronomeConfig::default().bpm;
        }
        config.bpm = config.bpm.clamp(MIN_BPM, MAX_BPM);
        config.subdivisions_per_beat = config.subdivisions_per_beat.max(1);
        config.accent_interval = config.accent_interval.max(1);
        config.lookahead_secs = config.lookahead_secs.max(0.0);

        Self {
            clock,
            config,
            running: false,
            next_event_time: 0.0,
            current_subdivision: 0,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.config.bpm
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Period at which the driver should call [`tick`](Self::tick)
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.tick_interval_ms.max(1))
    }

    /// Spacing between consecutive clicks
    pub fn seconds_per_subdivision(&self) -> f64 {
        60.0 / self.config.bpm / self.config.subdivisions_per_beat as f64
    }

    /// Start scheduling from the current engine time.
    ///
    /// No-op when already running or when the clock is unavailable.
    pub fn start(&mut self) {
        if self.running {
            return;
        }

        let Some(now) = self.clock.current_time() else {
            debug!("Metronome start ignored: audio clock unavailable");
            return;
        };

        self.running = true;
        self.next_event_time = now;
        debug!("Metronome started at {:.3}s, {} BPM", now, self.config.bpm);
        self.tick();
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            debug!("Metronome stopped");
        }
    }

    /// Flip between running and stopped; returns the new state
    pub fn toggle(&mut self) -> bool {
        if self.running {
            self.stop();
        } else {
            self.start();
        }
        self.running
    }

    /// Change tempo. A running scheduler is restarted; clicks already
    /// handed to the sink stay as scheduled.
    pub fn set_bpm(&mut self, bpm: f64) {
        if !bpm.is_finite() {
            warn!("Ignoring invalid tempo {}", bpm);
            return;
        }
        self.config.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        debug!("Metronome tempo set to {} BPM", self.config.bpm);

        if self.running {
            self.stop();
            self.start();
        }
    }

    /// Schedule every click inside the lookahead window; returns how many
    pub fn tick(&mut self) -> usize {
        if !self.running {
            return 0;
        }
        let Some(now) = self.clock.current_time() else {
            return 0;
        };

        let horizon = now + self.config.lookahead_secs;
        let mut scheduled = 0;
        while self.next_event_time < horizon {
            let event = self.make_event();
            trace!("Click at {:.3}s (accent: {})", event.time, event.accent);
            self.clock.schedule(event);
            self.advance();
            scheduled += 1;
        }
        scheduled
    }

    fn make_event(&self) -> ClickEvent {
        let accent = self.current_subdivision % self.config.accent_interval == 0;
        ClickEvent {
            time: self.next_event_time,
            subdivision: self.current_subdivision,
            accent,
            frequency: if accent {
                ACCENT_FREQUENCY
            } else {
                CLICK_FREQUENCY
            },
            duration: CLICK_DURATION,
        }
    }

    fn advance(&mut self) {
        self.next_event_time += self.seconds_per_subdivision();
        self.current_subdivision = (self.current_subdivision + 1) % self.config.accent_interval;
    }
}
