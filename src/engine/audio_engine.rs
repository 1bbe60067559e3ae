//! Audio Engine
//!
//! The control-side facade. Owns the arrangement, the transport clock and
//! the sample store, and turns every state change into one full graph
//! rebuild handed to the [`Renderer`].
//!
//! ```text
//! setTracks / setClips / play / seek / load
//!          │
//!          ▼
//!   EngineState + TransportClock + VFS entries
//!          │   GraphCompiler::compile
//!          ▼
//!     StereoGraph ──render()──▶ Renderer ──events──▶ MeterAggregator
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::compiler::{CompileInput, CompileReport, GraphCompiler};
use crate::engine::io::{DefaultSampleSource, SampleSource, SourceRef};
use crate::engine::meter::{MeterAggregator, MeterMap};
use crate::engine::renderer::{ChannelBuffer, IoConfig, Renderer, RendererEvent};
use crate::engine::state::{ClipState, EngineState, TrackState};
use crate::engine::subscribers::{Subscribers, Subscription};
use crate::engine::transport::{TransportClock, TransportState};
use crate::engine::vfs::{channel_path, VfsEntry, VirtualSampleStore};
use crate::error::{MixgraphError, Result};

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Disposed,
}

pub struct AudioEngine<R: Renderer> {
    renderer: R,
    config: EngineConfig,
    lifecycle: Lifecycle,
    sample_rate: u32,

    state: EngineState,
    transport: TransportClock,
    samples: Arc<VirtualSampleStore>,
    /// Keys whose channel buffers the renderer already holds
    published: HashSet<String>,

    compiler: GraphCompiler,
    last_report: CompileReport,

    meters: MeterAggregator,
    playhead_subscribers: Subscribers<f64>,
    meter_subscribers: Subscribers<MeterMap>,
    polling: bool,
}

impl<R: Renderer> std::fmt::Debug for AudioEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("lifecycle", &self.lifecycle)
            .field("sample_rate", &self.sample_rate)
            .field("transport", &self.transport.state())
            .field("tracks", &self.state.tracks.len())
            .field("clips", &self.state.clips.len())
            .field("samples", &self.samples)
            .finish()
    }
}

impl<R: Renderer> AudioEngine<R> {
    /// Engine with default config, loading samples from disk (and URLs with
    /// the `http-source` feature)
    pub fn new(renderer: R) -> Self {
        Self::with_config(renderer, EngineConfig::default())
    }

    pub fn with_config(renderer: R, config: EngineConfig) -> Self {
        Self::with_source(renderer, config, Arc::new(DefaultSampleSource::new()))
    }

    /// Engine fetching sample bytes through a custom source
    pub fn with_source(renderer: R, config: EngineConfig, source: Arc<dyn SampleSource>) -> Self {
        Self {
            renderer,
            sample_rate: config.sample_rate,
            compiler: GraphCompiler::new(config.smoothing_secs),
            config,
            lifecycle: Lifecycle::Uninitialized,
            state: EngineState::default(),
            transport: TransportClock::new(),
            samples: Arc::new(VirtualSampleStore::new(source)),
            published: HashSet::new(),
            last_report: CompileReport::default(),
            meters: MeterAggregator::new(),
            playhead_subscribers: Subscribers::new(),
            meter_subscribers: Subscribers::new(),
            polling: false,
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open the renderer's output
    ///
    /// On failure the engine stays uninitialized and the call may be retried.
    /// Calling again once initialized is a no-op returning the current rate.
    pub async fn initialize(&mut self, sample_rate_hint: Option<u32>) -> Result<u32> {
        match self.lifecycle {
            Lifecycle::Disposed => return Err(MixgraphError::Disposed),
            Lifecycle::Ready => return Ok(self.sample_rate),
            Lifecycle::Uninitialized => {}
        }

        let io = IoConfig {
            sample_rate: Some(sample_rate_hint.unwrap_or(self.config.sample_rate)),
            output_channels: self.config.output_channels,
        };
        let info = match self.renderer.initialize(io).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "audio output initialization failed");
                return Err(e);
            }
        };
        if info.sample_rate == 0 {
            return Err(MixgraphError::Initialization {
                reason: "renderer reported a zero sample rate".to_string(),
            });
        }

        self.sample_rate = info.sample_rate;
        self.lifecycle = Lifecycle::Ready;
        info!(sample_rate = self.sample_rate, "audio engine initialized");
        self.rebuild();
        Ok(self.sample_rate)
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Tear everything down; safe to call more than once
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.polling = false;
        self.transport.reset();
        self.renderer.release();
        self.playhead_subscribers.clear();
        self.meter_subscribers.clear();
        self.samples.clear();
        self.published.clear();
        self.meters.clear();
        self.lifecycle = Lifecycle::Disposed;
        info!("audio engine disposed");
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// Start playback from the current playhead. No-op before `initialize`
    /// or while already playing.
    pub fn play(&mut self) {
        if !self.is_initialized() {
            debug!("play ignored: engine not initialized");
            return;
        }
        self.renderer.resume();
        let now = self.renderer.current_time();
        if self.transport.play(now) {
            self.rebuild();
            self.polling = true;
        }
    }

    /// Stop playback, keeping the playhead where it is
    pub fn stop(&mut self) {
        let now = self.renderer.current_time();
        if self.transport.stop(now) {
            self.polling = false;
            self.rebuild();
        }
    }

    /// Seek to `seconds` (clamped to >= 0)
    ///
    /// Subscribers are notified synchronously whether or not the transport is
    /// playing.
    pub fn set_playhead(&mut self, seconds: f64) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        let now = self.renderer.current_time();
        let position = self.transport.set_playhead(seconds, now);
        if self.transport.is_playing() {
            self.rebuild();
        }
        self.playhead_subscribers.emit(&position);
    }

    pub fn get_playhead(&self) -> f64 {
        self.transport.playhead(self.renderer.current_time())
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    /// Called with the playhead on every tick while playing and on every seek
    pub fn on_playhead_update<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&f64) + Send + 'static,
    {
        self.playhead_subscribers.subscribe(callback)
    }

    /// Called with the latest level per meter tap, once per tick that has any
    ///
    /// Each map holds only the taps that reported since the previous tick; a
    /// tap that stayed quiet is absent rather than repeated.
    pub fn on_meter_update<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&MeterMap) + Send + 'static,
    {
        self.meter_subscribers.subscribe(callback)
    }

    /// Display-refresh driver: drains renderer events and notifies subscribers
    ///
    /// Does nothing before `initialize` or after `dispose`.
    pub fn tick(&mut self) {
        if !self.is_initialized() {
            return;
        }

        for event in self.renderer.drain_events() {
            match event {
                RendererEvent::Error(message) => warn!(%message, "renderer error"),
                RendererEvent::Meter { source, min, max } => self.meters.record(source, min, max),
            }
        }

        if self.polling && self.transport.is_playing() {
            let playhead = self.get_playhead();
            self.playhead_subscribers.emit(&playhead);
        }

        if let Some(levels) = self.meters.flush() {
            self.meter_subscribers.emit(&levels);
        }
    }

    // ------------------------------------------------------------------------
    // Arrangement
    // ------------------------------------------------------------------------

    /// Replace all tracks
    pub fn set_tracks(&mut self, tracks: Vec<TrackState>) {
        self.state.tracks = tracks;
        self.rebuild();
    }

    /// Replace all clips
    pub fn set_clips(&mut self, clips: Vec<ClipState>) {
        self.state.clips = clips;
        self.rebuild();
    }

    pub fn set_master_gain(&mut self, db: f32) {
        self.state.master_gain = db;
        self.rebuild();
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    // ------------------------------------------------------------------------
    // Samples
    // ------------------------------------------------------------------------

    /// Load and decode a sample, publish it to the renderer, and rebuild
    ///
    /// Loading a key that is already present returns its entry without
    /// fetching again.
    pub async fn load_audio_into_vfs(
        &mut self,
        key: &str,
        source: impl Into<SourceRef>,
    ) -> Result<VfsEntry> {
        match self.lifecycle {
            Lifecycle::Disposed => return Err(MixgraphError::Disposed),
            Lifecycle::Uninitialized => return Err(MixgraphError::NotInitialized),
            Lifecycle::Ready => {}
        }

        let source = source.into();
        let sample = self.samples.load(key, &source).await?;

        if !self.published.contains(key) {
            let buffers: HashMap<String, ChannelBuffer> = sample
                .channels
                .iter()
                .enumerate()
                .map(|(channel, samples)| {
                    (
                        channel_path(key, channel),
                        ChannelBuffer {
                            samples: Arc::clone(samples),
                            sample_rate: sample.entry.sample_rate,
                        },
                    )
                })
                .collect();
            self.renderer.update_virtual_file_system(buffers).await?;
            self.published.insert(key.to_string());
            info!(key, channels = sample.entry.channels, "sample published");
            self.rebuild();
        }

        Ok(sample.entry)
    }

    pub fn is_audio_loaded(&self, key: &str) -> bool {
        self.samples.is_loaded(key)
    }

    pub fn get_vfs_entry(&self, key: &str) -> Option<VfsEntry> {
        self.samples.entry(key)
    }

    pub fn get_vfs_entries(&self) -> HashMap<String, VfsEntry> {
        self.samples.entries()
    }

    /// Drop every loaded sample whose key is not in `active_keys`
    ///
    /// Returns the released keys.
    pub async fn prune_vfs(&mut self, active_keys: &HashSet<String>) -> Result<Vec<String>> {
        let released = self.samples.prune(active_keys);
        if released.is_empty() {
            return Ok(released);
        }

        for key in &released {
            self.published.remove(key);
        }
        if self.is_initialized() {
            self.renderer.prune_virtual_file_system(&released).await?;
        }
        info!(released = released.len(), "pruned sample store");
        self.rebuild();
        Ok(released)
    }

    /// Shared handle to the sample store, for loading off the control path
    pub fn sample_store(&self) -> Arc<VirtualSampleStore> {
        Arc::clone(&self.samples)
    }

    pub fn get_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    // ------------------------------------------------------------------------
    // Collaborators
    // ------------------------------------------------------------------------

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Diagnostics from the most recent rebuild
    pub fn last_compile_report(&self) -> &CompileReport {
        &self.last_report
    }

    /// Compile the full graph and hand it to the renderer
    fn rebuild(&mut self) {
        if !self.is_initialized() {
            return;
        }

        let entries = self.samples.entries();
        let compiled = self.compiler.compile(&CompileInput {
            state: &self.state,
            entries: &entries,
            playing: self.transport.is_playing(),
            time_offset: self.transport.transport_time_offset(),
            sample_rate: self.sample_rate,
        });

        debug!(
            playing = self.transport.is_playing(),
            nodes = compiled.graph.left.node_count() + compiled.graph.right.node_count(),
            silenced = compiled.report.silenced.len(),
            "graph rebuilt"
        );
        self.renderer.render(compiled.graph);
        self.last_report = compiled.report;
    }
}

impl<R: Renderer> Drop for AudioEngine<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}
