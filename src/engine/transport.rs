//! Transport Clock for Mixgraph
//!
//! Play/stop/seek state machine. The clock never reads time itself: every
//! operation receives the renderer's current clock (`now`, in seconds), which
//! keeps the playhead math deterministic and testable.
//!
//! While playing, the playhead is derived as `now - play_start_time`. The same
//! anchor is the graph's time base: transport time inside the compiled graph
//! is `renderer_time - transport_time_offset`.

use std::fmt;

use tracing::debug;

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Not playing; the stored playhead is authoritative (default state)
    #[default]
    Stopped,
    /// Playhead advances with the renderer clock
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
        }
    }
}

/// Playhead position and renderer-clock mapping
#[derive(Debug, Clone, Default)]
pub struct TransportClock {
    state: TransportState,

    /// Playhead in seconds; authoritative while stopped
    playhead_position: f64,

    /// Renderer clock time that corresponds to playhead 0 while playing
    play_start_time: f64,
}

impl TransportClock {
    /// Create a stopped clock at position 0
    ///
    /// # Example
    /// ```
    /// use mixgraph::engine::TransportClock;
    /// let transport = TransportClock::new();
    /// assert!(!transport.is_playing());
    /// assert_eq!(transport.playhead(0.0), 0.0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playback from the stored playhead
    ///
    /// Returns `false` (no-op) if already playing.
    ///
    /// # Example
    /// ```
    /// use mixgraph::engine::TransportClock;
    /// let mut transport = TransportClock::new();
    /// transport.set_playhead(2.0, 100.0);
    /// assert!(transport.play(100.0));
    /// assert_eq!(transport.playhead(101.5), 3.5);
    /// ```
    pub fn play(&mut self, now: f64) -> bool {
        match self.state {
            TransportState::Playing => {
                debug!("[TRANSPORT] Already playing");
                false
            }
            TransportState::Stopped => {
                self.play_start_time = now - self.playhead_position;
                self.state = TransportState::Playing;
                debug!("[TRANSPORT] Play from {:.3}s", self.playhead_position);
                true
            }
        }
    }

    /// Stop playback, keeping the playhead where it is
    ///
    /// Returns `false` (no-op) if already stopped.
    pub fn stop(&mut self, now: f64) -> bool {
        match self.state {
            TransportState::Stopped => {
                debug!("[TRANSPORT] Already stopped");
                false
            }
            TransportState::Playing => {
                self.playhead_position = self.playhead(now);
                self.state = TransportState::Stopped;
                debug!("[TRANSPORT] Stopped at {:.3}s", self.playhead_position);
                true
            }
        }
    }

    /// Seek to `position` seconds (clamped to >= 0)
    ///
    /// While playing, the clock anchor is moved so playback continues from
    /// the new position without a jump. Returns the clamped position.
    pub fn set_playhead(&mut self, position: f64, now: f64) -> f64 {
        let position = position.max(0.0);
        self.playhead_position = position;
        if self.state == TransportState::Playing {
            self.play_start_time = now - position;
        }
        debug!("[TRANSPORT] Seek to {:.3}s", position);
        position
    }

    /// Current playhead in seconds
    pub fn playhead(&self, now: f64) -> f64 {
        match self.state {
            TransportState::Playing => (now - self.play_start_time).max(0.0),
            TransportState::Stopped => self.playhead_position,
        }
    }

    /// Offset subtracted from renderer time to get transport time
    pub fn transport_time_offset(&self) -> f64 {
        self.play_start_time
    }

    /// Renderer clock time at which the current playback began at position 0
    pub fn play_start_time(&self) -> f64 {
        self.play_start_time
    }

    /// Check if transport is currently playing
    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Get the current transport state
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Return to the stopped state at position 0
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
