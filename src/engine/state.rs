//! Engine state snapshots
//!
//! Tracks, clips and the master fader as handed over by the host
//! application. The engine never patches these in place: every setter swaps
//! in a whole new list and the graph is rebuilt from the result.

use serde::{Deserialize, Serialize};

use crate::engine::effects::TrackEffect;

/// One mixer track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackState {
    pub id: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    /// Fader level in dB, nominally `[-60, +12]`
    #[serde(default)]
    pub gain: f32,
    /// Stereo position in `[-1, +1]`
    #[serde(default)]
    pub pan: f32,
    /// Insert effects, applied in order before the fader
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<TrackEffect>,
}

impl TrackState {
    /// Unity-gain, centered, unmuted track
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            muted: false,
            solo: false,
            gain: 0.0,
            pan: 0.0,
            effects: Vec::new(),
        }
    }

    pub fn with_gain(mut self, gain_db: f32) -> Self {
        self.gain = gain_db;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn with_solo(mut self, solo: bool) -> Self {
        self.solo = solo;
        self
    }

    pub fn with_effect(mut self, effect: TrackEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// A region of a sample placed on a track
///
/// All positions are in samples at the engine sample rate. The caller is
/// responsible for keeping `audio_start_time + duration` inside the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipState {
    pub id: String,
    pub track_id: String,
    /// Sample store key of the source audio
    pub file_id: String,
    /// Timeline position
    pub start_time: i64,
    /// Timeline length
    pub duration: i64,
    /// Offset into the source audio (left trim)
    #[serde(default)]
    pub audio_start_time: i64,
    /// Clip gain in dB
    #[serde(default)]
    pub gain: f32,
}

impl ClipState {
    pub fn new(
        id: impl Into<String>,
        track_id: impl Into<String>,
        file_id: impl Into<String>,
        start_time: i64,
        duration: i64,
    ) -> Self {
        Self {
            id: id.into(),
            track_id: track_id.into(),
            file_id: file_id.into(),
            start_time,
            duration,
            audio_start_time: 0,
            gain: 0.0,
        }
    }

    pub fn with_audio_start(mut self, audio_start_time: i64) -> Self {
        self.audio_start_time = audio_start_time;
        self
    }

    pub fn with_gain(mut self, gain_db: f32) -> Self {
        self.gain = gain_db;
        self
    }
}

/// Everything the graph compiler needs besides transport and samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    #[serde(default)]
    pub tracks: Vec<TrackState>,
    #[serde(default)]
    pub clips: Vec<ClipState>,
    /// Master fader in dB
    #[serde(default)]
    pub master_gain: f32,
}

impl EngineState {
    /// Clips belonging to `track_id`, in list order
    pub fn clips_for<'a>(&'a self, track_id: &'a str) -> impl Iterator<Item = &'a ClipState> + 'a {
        self.clips.iter().filter(move |clip| clip.track_id == track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_track_from_camel_case_json() {
        let track: TrackState =
            serde_json::from_str(r#"{"id":"drums","muted":true,"gain":-6.0}"#).unwrap();
        assert_eq!(
            track,
            TrackState::new("drums").with_muted(true).with_gain(-6.0)
        );
    }

    #[test]
    fn test_clip_from_camel_case_json() {
        let json = r#"{
            "id": "c1",
            "trackId": "drums",
            "fileId": "kick",
            "startTime": 44100,
            "duration": 88200,
            "audioStartTime": 22050,
            "gain": -3.0
        }"#;
        let clip: ClipState = serde_json::from_str(json).unwrap();
        assert_eq!(
            clip,
            ClipState::new("c1", "drums", "kick", 44100, 88200)
                .with_audio_start(22050)
                .with_gain(-3.0)
        );
    }

    #[test]
    fn test_clips_for_track() {
        let state = EngineState {
            tracks: vec![TrackState::new("a"), TrackState::new("b")],
            clips: vec![
                ClipState::new("1", "a", "f", 0, 10),
                ClipState::new("2", "b", "f", 0, 10),
                ClipState::new("3", "a", "f", 20, 10),
            ],
            master_gain: 0.0,
        };
        let ids: Vec<&str> = state.clips_for("a").map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
