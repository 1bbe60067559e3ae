//! Engine configuration and session documents

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::compiler::DEFAULT_SMOOTHING_SECS;
use crate::engine::offline::DEFAULT_SAMPLE_RATE;
use crate::engine::state::{ClipState, EngineState, TrackState};
use crate::error::{MixgraphError, Result};

/// Lowest sample rate a config may ask for
pub const MIN_SAMPLE_RATE: u32 = 8000;

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_smoothing_secs() -> f64 {
    DEFAULT_SMOOTHING_SECS
}

fn default_output_channels() -> u16 {
    2
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Preferred output sample rate; the renderer has the final say
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Time constant for gain and pan smoothing, in seconds
    #[serde(default = "default_smoothing_secs")]
    pub smoothing_secs: f64,
    #[serde(default = "default_output_channels")]
    pub output_channels: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            smoothing_secs: default_smoothing_secs(),
            output_channels: default_output_channels(),
        }
    }
}

impl EngineConfig {
    /// Check that values are usable
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(MixgraphError::Config {
                reason: format!(
                    "sampleRate must be at least {}, got {}",
                    MIN_SAMPLE_RATE, self.sample_rate
                ),
            });
        }
        if !self.smoothing_secs.is_finite() || self.smoothing_secs < 0.0 {
            return Err(MixgraphError::Config {
                reason: format!("smoothingSecs must be >= 0, got {}", self.smoothing_secs),
            });
        }
        if self.output_channels != 2 {
            return Err(MixgraphError::Config {
                reason: format!(
                    "only stereo output is supported, got {} channels",
                    self.output_channels
                ),
            });
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = read_document(path)?;
        Self::from_json_str(&json)
    }
}

/// A complete mix: engine config, arrangement, and where each sample lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub tracks: Vec<TrackState>,
    #[serde(default)]
    pub clips: Vec<ClipState>,
    #[serde(default)]
    pub master_gain: f32,
    /// Sample key to file path; relative paths resolve against the session file
    #[serde(default)]
    pub files: BTreeMap<String, PathBuf>,
}

impl Session {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let session: Self = serde_json::from_str(json)?;
        session.config.validate()?;
        Ok(session)
    }

    /// Load a session, resolving relative sample paths against its directory
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = read_document(path)?;
        let mut session = Self::from_json_str(&json)?;
        if let Some(base) = path.parent() {
            for file in session.files.values_mut() {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        Ok(session)
    }

    /// The arrangement as the engine sees it
    pub fn engine_state(&self) -> EngineState {
        EngineState {
            tracks: self.tracks.clone(),
            clips: self.clips.clone(),
            master_gain: self.master_gain,
        }
    }

    /// End of the last clip, in seconds at the session sample rate
    pub fn length_secs(&self) -> f64 {
        let rate = self.config.sample_rate.max(1) as f64;
        self.clips
            .iter()
            .map(|clip| (clip.start_time + clip.duration) as f64 / rate)
            .fold(0.0, f64::max)
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MixgraphError::FileNotFound {
            path: path.display().to_string(),
            source: Some(e),
        },
        _ => MixgraphError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.smoothing_secs, 0.02);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(EngineConfig::from_json_str(r#"{"sampleRate":0}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"sampleRate":40}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"sampleRate":8000}"#).is_ok());
        assert!(EngineConfig::from_json_str(r#"{"smoothingSecs":-1}"#).is_err());
        let err = EngineConfig::from_json_str(r#"{"outputChannels":6}"#).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_session_resolves_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "tracks": [{{"id": "t"}}],
                "clips": [{{"id": "c", "trackId": "t", "fileId": "k", "startTime": 44100, "duration": 88200}}],
                "files": {{"k": "kick.wav", "abs": "/tmp/abs.wav"}}
            }}"#
        )
        .unwrap();

        let session = Session::from_json_file(&path).unwrap();
        assert_eq!(session.files["k"], dir.path().join("kick.wav"));
        assert_eq!(session.files["abs"], PathBuf::from("/tmp/abs.wav"));
        assert_eq!(session.length_secs(), 3.0);
        assert_eq!(session.engine_state().clips.len(), 1);
    }

    #[test]
    fn test_missing_session_file() {
        let err = Session::from_json_file(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(matches!(err, MixgraphError::FileNotFound { .. }));
    }
}
