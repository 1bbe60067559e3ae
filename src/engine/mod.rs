//! Audio Engine Module
//!
//! Control-side orchestration of an external audio renderer:
//! - Decibel and pan math
//! - Sample buffers, WAV I/O and the virtual sample store
//! - Transport clock and mute/solo resolution
//! - Graph description and compiler
//! - Meter aggregation and subscriber registries
//! - The renderer interface, an offline renderer, and the engine facade

pub mod audio_engine;
pub mod buffer;
pub mod compiler;
pub mod effects;
pub mod gain;
pub mod graph;
pub mod io;
pub mod meter;
pub mod mixer;
pub mod offline;
pub mod renderer;
pub mod state;
pub mod subscribers;
pub mod transport;
pub mod vfs;

pub use audio_engine::{AudioEngine, Lifecycle};
pub use buffer::{AudioBuffer, ChannelLayout};
pub use compiler::{
    ClipSchedule, CompileInput, CompileReport, CompiledGraph, GraphCompiler, SilenceReason,
    SilencedClip, DEFAULT_SMOOTHING_SECS,
};
pub use effects::{FilterEffect, FilterKind, TrackEffect};
pub use gain::{clamp_db, db_to_gain, gain_to_db, pan_to_gains, MAX_DB, MIN_DB};
pub use graph::{Node, NodeRef, SeqEvent, StereoGraph};
pub use io::{
    content_key, decode_wav, encode_wav, export_wav, generate_test_tone, DefaultSampleSource,
    SampleSource, SourceRef,
};
pub use meter::{MeterAggregator, MeterMap, MeterValue};
pub use mixer::{any_soloed, is_audible, resolve_audibility};
pub use offline::{bounce, OfflineRenderer};
pub use renderer::{ChannelBuffer, IoConfig, Renderer, RendererEvent, RendererInfo};
pub use state::{ClipState, EngineState, TrackState};
pub use subscribers::{Subscribers, Subscription};
pub use transport::{TransportClock, TransportState};
pub use vfs::{channel_path, LoadedSample, VfsEntry, VirtualSampleStore};
