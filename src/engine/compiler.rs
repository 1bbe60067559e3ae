//! Graph Compiler
//!
//! Builds the complete stereo graph description from an [`EngineState`]
//! snapshot. Every call starts from scratch; nothing is diffed against the
//! previous graph.
//!
//! # Trimmed clip playback
//!
//! The sample sequencer reads its buffer at `transport_time - trigger_time`.
//! To start audible playback `audio_start` seconds into the source exactly at
//! the clip's timeline start, the sequencer is triggered early by the trim
//! amount and a gate (`transport_time >= start`) mutes the pre-roll:
//!
//! ```text
//!   trigger = max(0, start - audio_start)     sequence: 1 @ trigger
//!   gate    = start                                      0 @ start + duration
//!   out     = clip_gain * gate * sampleseq
//! ```

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::effects::TrackEffect;
use crate::engine::gain::{db_to_gain, pan_to_gains};
use crate::engine::graph::{
    biquad, constant, ge, meter, mul, sample_seq, smooth, sub, sum, time, NodeRef,
    SeqEvent, StereoGraph,
};
use crate::engine::mixer::{any_soloed, is_audible};
use crate::engine::state::{ClipState, EngineState, TrackState};
use crate::engine::vfs::{channel_path, VfsEntry};

/// Default parameter smoothing time constant (20 ms)
pub const DEFAULT_SMOOTHING_SECS: f64 = 0.02;

/// Why a clip produced no signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SilenceReason {
    /// The clip's file is not (yet) in the sample store
    MissingSample,
    /// A derived timing or gain value was NaN or infinite
    NonFiniteTiming,
    /// The clip names a track that does not exist
    UnknownTrack,
}

/// A clip left out of the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SilencedClip {
    pub clip_id: String,
    pub file_id: String,
    pub reason: SilenceReason,
}

/// Diagnostics from one compilation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompileReport {
    pub silenced: Vec<SilencedClip>,
}

impl CompileReport {
    fn silence(&mut self, clip: &ClipState, reason: SilenceReason) {
        match reason {
            SilenceReason::MissingSample => {
                debug!(clip = %clip.id, file = %clip.file_id, "sample not loaded, clip silent")
            }
            SilenceReason::NonFiniteTiming => {
                warn!(clip = %clip.id, file = %clip.file_id, "non-finite clip timing, clip silenced")
            }
            SilenceReason::UnknownTrack => {
                warn!(clip = %clip.id, track = %clip.track_id, "clip references unknown track")
            }
        }
        self.silenced.push(SilencedClip {
            clip_id: clip.id.clone(),
            file_id: clip.file_id.clone(),
            reason,
        });
    }

    /// Reason the given clip was silenced, if it was
    pub fn reason_for(&self, clip_id: &str) -> Option<SilenceReason> {
        self.silenced
            .iter()
            .find(|s| s.clip_id == clip_id)
            .map(|s| s.reason)
    }
}

/// Output of [`GraphCompiler::compile`]
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    pub graph: StereoGraph,
    pub report: CompileReport,
}

/// Everything a compilation reads
#[derive(Debug, Clone, Copy)]
pub struct CompileInput<'a> {
    pub state: &'a EngineState,
    pub entries: &'a HashMap<String, VfsEntry>,
    pub playing: bool,
    /// Renderer time at transport position 0
    pub time_offset: f64,
    pub sample_rate: u32,
}

/// Resolved clip timing, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSchedule {
    /// Timeline start; also the gate threshold
    pub start: f64,
    /// Timeline length
    pub duration: f64,
    /// Left trim into the source
    pub audio_start: f64,
    /// Full source length
    pub source_duration: f64,
    /// When the sequencer starts reading the source from zero
    pub trigger_time: f64,
    /// When the sequencer stops
    pub stop_time: f64,
}

impl ClipSchedule {
    /// Resolve a clip against its sample entry
    ///
    /// Returns `None` if any derived value is non-finite.
    pub fn resolve(clip: &ClipState, entry: &VfsEntry, sample_rate: u32) -> Option<Self> {
        let rate = sample_rate as f64;
        let start = clip.start_time as f64 / rate;
        let duration = clip.duration as f64 / rate;
        let audio_start = clip.audio_start_time as f64 / rate;
        let source_duration = entry.duration as f64 / entry.sample_rate as f64;

        let schedule = Self {
            start,
            duration,
            audio_start,
            source_duration,
            trigger_time: (start - audio_start).max(0.0),
            stop_time: start + duration,
        };

        [
            schedule.start,
            schedule.duration,
            schedule.audio_start,
            schedule.source_duration,
            schedule.trigger_time,
            schedule.stop_time,
        ]
        .iter()
        .all(|v| v.is_finite())
        .then_some(schedule)
    }

    /// Gate threshold: output is muted before this transport time
    pub fn gate_time(&self) -> f64 {
        self.start
    }

    /// Trigger then stop
    pub fn events(&self) -> Vec<SeqEvent> {
        vec![
            SeqEvent::trigger(self.trigger_time),
            SeqEvent::stop(self.stop_time),
        ]
    }
}

/// Stateless compiler from engine state to graph description
#[derive(Debug, Clone)]
pub struct GraphCompiler {
    smoothing_secs: f64,
}

impl Default for GraphCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_SECS)
    }
}

impl GraphCompiler {
    pub fn new(smoothing_secs: f64) -> Self {
        Self { smoothing_secs }
    }

    pub fn smoothing_secs(&self) -> f64 {
        self.smoothing_secs
    }

    /// Build the full stereo graph
    ///
    /// While stopped this is hard silence on both channels. Bad clip data
    /// never fails compilation; the clip is left out and listed in the report.
    pub fn compile(&self, input: &CompileInput<'_>) -> CompiledGraph {
        let mut report = CompileReport::default();

        if !input.playing {
            return CompiledGraph {
                graph: StereoGraph::silence(),
                report,
            };
        }

        let transport_time = sub(time(), constant(input.time_offset));
        let soloed = any_soloed(&input.state.tracks);

        let mut lefts = Vec::with_capacity(input.state.tracks.len());
        let mut rights = Vec::with_capacity(input.state.tracks.len());
        for track in &input.state.tracks {
            let [left, right] = self.compile_track(
                track,
                is_audible(track, soloed),
                input,
                &transport_time,
                &mut report,
            );
            lefts.push(left);
            rights.push(right);
        }

        let track_ids: HashSet<&str> = input.state.tracks.iter().map(|t| t.id.as_str()).collect();
        for clip in &input.state.clips {
            if !track_ids.contains(clip.track_id.as_str()) {
                report.silence(clip, SilenceReason::UnknownTrack);
            }
        }

        let master = finite_gain(db_to_gain(input.state.master_gain) as f64, "master");
        let left = mul(vec![self.smoothed("master-gain-L".to_string(), master), sum(lefts)]);
        let right = mul(vec![self.smoothed("master-gain-R".to_string(), master), sum(rights)]);

        CompiledGraph {
            graph: StereoGraph {
                left: meter("master-L", left),
                right: meter("master-R", right),
            },
            report,
        }
    }

    /// Smoothed constant; `key` must be stable across rebuilds so the
    /// renderer glides from the previous value instead of jumping
    fn smoothed(&self, key: String, value: f64) -> NodeRef {
        smooth(key, self.smoothing_secs, constant(value))
    }

    fn compile_track(
        &self,
        track: &TrackState,
        audible: bool,
        input: &CompileInput<'_>,
        transport_time: &NodeRef,
        report: &mut CompileReport,
    ) -> [NodeRef; 2] {
        let mut lefts = Vec::new();
        let mut rights = Vec::new();
        for clip in input.state.clips_for(&track.id) {
            if let Some([left, right]) = self.compile_clip(clip, input, transport_time, report) {
                lefts.push(left);
                rights.push(right);
            }
        }

        let mut left = sum(lefts);
        let mut right = sum(rights);

        for (index, effect) in track.effects.iter().enumerate() {
            if !effect.is_enabled() {
                continue;
            }
            match effect {
                TrackEffect::Filter(filter) => {
                    let Some(coeffs) = filter.coefficients(input.sample_rate as f64) else {
                        warn!(
                            track = %track.id,
                            effect = index,
                            "unusable filter parameters, bypassing"
                        );
                        continue;
                    };
                    left = biquad(format!("{}-filter{}-L", track.id, index), coeffs, left);
                    right = biquad(format!("{}-filter{}-R", track.id, index), coeffs, right);
                }
            }
        }

        let gain = if audible {
            finite_gain(db_to_gain(track.gain) as f64, &track.id)
        } else {
            0.0
        };
        let (pan_left, pan_right) = pan_to_gains(track.pan);

        let id = &track.id;
        let left = mul(vec![
            self.smoothed(format!("{}-pan-L", id), pan_left),
            mul(vec![self.smoothed(format!("{}-gain-L", id), gain), left]),
        ]);
        let right = mul(vec![
            self.smoothed(format!("{}-pan-R", id), pan_right),
            mul(vec![self.smoothed(format!("{}-gain-R", id), gain), right]),
        ]);

        [
            meter(format!("{}-L", track.id), left),
            meter(format!("{}-R", track.id), right),
        ]
    }

    fn compile_clip(
        &self,
        clip: &ClipState,
        input: &CompileInput<'_>,
        transport_time: &NodeRef,
        report: &mut CompileReport,
    ) -> Option<[NodeRef; 2]> {
        let Some(entry) = input.entries.get(&clip.file_id) else {
            report.silence(clip, SilenceReason::MissingSample);
            return None;
        };

        let clip_gain = db_to_gain(clip.gain) as f64;
        let schedule = ClipSchedule::resolve(clip, entry, input.sample_rate)
            .filter(|_| clip_gain.is_finite());
        let Some(schedule) = schedule else {
            report.silence(clip, SilenceReason::NonFiniteTiming);
            return None;
        };

        let gate = ge(transport_time.clone(), constant(schedule.gate_time()));
        let events = schedule.events();

        let channel = |index: usize| {
            // Mono sources feed both sides from channel 0
            let source_channel = if entry.channels > 1 { index } else { 0 };
            let seq = sample_seq(
                channel_path(&clip.file_id, source_channel),
                schedule.source_duration,
                events.clone(),
                transport_time.clone(),
            );
            mul(vec![constant(clip_gain), mul(vec![gate.clone(), seq])])
        };

        Some([channel(0), channel(1)])
    }
}

fn finite_gain(gain: f64, what: &str) -> f64 {
    if gain.is_finite() {
        gain
    } else {
        warn!(gain = what, "non-finite gain, muting");
        0.0
    }
}
