//! Offline Renderer
//!
//! A [`Renderer`] with no audio device behind it. The clock only moves when
//! the caller renders or advances it, and the graph is evaluated one frame at
//! a time. Used for bouncing sessions to disk and for driving the engine in
//! tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::engine::audio_engine::AudioEngine;
use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::effects::BiquadState;
use crate::engine::graph::{Node, NodeRef, SeqEvent, StereoGraph};
use crate::engine::renderer::{ChannelBuffer, IoConfig, Renderer, RendererEvent, RendererInfo};
use crate::error::{MixgraphError, Result};

/// Sample rate used when neither the caller nor the config asks for one
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

fn node_id(node: &NodeRef) -> usize {
    std::sync::Arc::as_ptr(node) as usize
}

/// DSP state of stateful nodes, keyed by the node's stable key so it
/// survives graph rebuilds
#[derive(Debug, Default)]
struct DspState {
    smoothers: HashMap<String, f64>,
    filters: HashMap<String, BiquadState>,
    /// Outputs of stateful nodes already computed this frame, by node identity
    frame_cache: HashMap<usize, f64>,
    /// (min, max) per meter tap since the last flush
    taps: HashMap<String, (f32, f32)>,
}

/// Manual-clock renderer that evaluates graph descriptions in software
#[derive(Debug)]
pub struct OfflineRenderer {
    sample_rate: u32,
    fail_initialization: bool,
    initialized: bool,
    released: bool,
    resumed: bool,

    time_origin: f64,
    frames_rendered: u64,

    graph: StereoGraph,
    render_count: usize,
    files: HashMap<String, ChannelBuffer>,
    dsp: DspState,
    reported_missing: HashSet<String>,
    events: Vec<RendererEvent>,
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DspState {
    /// Drop state for nodes that are no longer part of `graph`
    fn retain_for(&mut self, graph: &StereoGraph) {
        let live: HashSet<&str> = graph
            .left
            .state_keys()
            .into_iter()
            .chain(graph.right.state_keys())
            .collect();
        self.smoothers.retain(|key, _| live.contains(key.as_str()));
        self.filters.retain(|key, _| live.contains(key.as_str()));
        self.frame_cache.clear();
    }
}

impl OfflineRenderer {
    pub fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            fail_initialization: false,
            initialized: false,
            released: false,
            resumed: false,
            time_origin: 0.0,
            frames_rendered: 0,
            graph: StereoGraph::silence(),
            render_count: 0,
            files: HashMap::new(),
            dsp: DspState::default(),
            reported_missing: HashSet::new(),
            events: Vec::new(),
        }
    }

    /// Make the next `initialize` call fail
    pub fn failing() -> Self {
        Self {
            fail_initialization: true,
            ..Self::new()
        }
    }

    pub fn set_fail_initialization(&mut self, fail: bool) {
        self.fail_initialization = fail;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Jump the clock to `time` seconds
    pub fn set_time(&mut self, time: f64) {
        self.time_origin = time;
        self.frames_rendered = 0;
    }

    /// Move the clock forward without rendering
    pub fn advance(&mut self, seconds: f64) {
        let now = self.current_time();
        self.set_time(now + seconds);
    }

    /// The graph most recently handed over
    pub fn graph(&self) -> &StereoGraph {
        &self.graph
    }

    /// How many times `render` has been called
    pub fn render_count(&self) -> usize {
        self.render_count
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Published channel paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Queue an event as if the audio thread had reported it
    pub fn push_event(&mut self, event: RendererEvent) {
        self.events.push(event);
    }

    /// Evaluate a single frame at renderer time `time` without moving the clock
    ///
    /// Meter readings from this frame are reported as events.
    pub fn evaluate_at(&mut self, time: f64) -> (f32, f32) {
        let frame = self.evaluate_frame(time);
        self.flush_taps();
        frame
    }

    /// Render `frames` frames starting at the current clock, then advance it
    pub fn render_block(&mut self, frames: usize) -> AudioBuffer {
        let mut out = AudioBuffer::new(frames, ChannelLayout::Stereo, self.sample_rate);
        let start = self.current_time();
        let rate = self.sample_rate as f64;

        for i in 0..frames {
            let (left, right) = self.evaluate_frame(start + i as f64 / rate);
            out.channel_mut(0)[i] = left;
            out.channel_mut(1)[i] = right;
        }

        self.frames_rendered += frames as u64;
        self.flush_taps();
        out
    }

    fn evaluate_frame(&mut self, time: f64) -> (f32, f32) {
        self.dsp.frame_cache.clear();
        let graph = self.graph.clone();
        let left = self.eval(&graph.left, time);
        let right = self.eval(&graph.right, time);
        (left as f32, right as f32)
    }

    fn flush_taps(&mut self) {
        let mut taps: Vec<(String, (f32, f32))> = self.dsp.taps.drain().collect();
        taps.sort_by(|a, b| a.0.cmp(&b.0));
        for (source, (min, max)) in taps {
            self.events.push(RendererEvent::Meter { source, min, max });
        }
    }

    fn eval(&mut self, node: &NodeRef, time: f64) -> f64 {
        match &**node {
            Node::Const { value } => *value,
            Node::Time => time,
            Node::Add { inputs } => inputs.iter().map(|n| self.eval(n, time)).sum(),
            Node::Mul { inputs } => inputs.iter().map(|n| self.eval(n, time)).product(),
            Node::Sub { lhs, rhs } => self.eval(lhs, time) - self.eval(rhs, time),
            Node::Ge { lhs, rhs } => {
                if self.eval(lhs, time) >= self.eval(rhs, time) {
                    1.0
                } else {
                    0.0
                }
            }
            Node::SampleSeq {
                path,
                duration,
                events,
                time: seq_time,
            } => {
                let t = self.eval(seq_time, time);
                self.read_sequence(path, *duration, events, t)
            }
            Node::Smooth {
                key,
                time_constant,
                input,
            } => {
                let id = node_id(node);
                if let Some(&cached) = self.dsp.frame_cache.get(&id) {
                    return cached;
                }
                let x = self.eval(input, time);
                let coeff = if *time_constant > 0.0 {
                    1.0 - (-1.0 / (time_constant * self.sample_rate as f64)).exp()
                } else {
                    1.0
                };
                // A smoother seen for the first time starts at its target
                let y = match self.dsp.smoothers.get(key) {
                    Some(&prev) => prev + coeff * (x - prev),
                    None => x,
                };
                self.dsp.smoothers.insert(key.clone(), y);
                self.dsp.frame_cache.insert(id, y);
                y
            }
            Node::Biquad { key, coeffs, input } => {
                let id = node_id(node);
                if let Some(&cached) = self.dsp.frame_cache.get(&id) {
                    return cached;
                }
                let x = self.eval(input, time);
                let y = match self.dsp.filters.get_mut(key) {
                    Some(state) => state.process(x, coeffs),
                    None => {
                        let mut state = BiquadState::default();
                        let y = state.process(x, coeffs);
                        self.dsp.filters.insert(key.clone(), state);
                        y
                    }
                };
                self.dsp.frame_cache.insert(id, y);
                y
            }
            Node::Meter { name, input } => {
                let x = self.eval(input, time) as f32;
                let tap = self.dsp.taps.entry(name.clone()).or_insert((x, x));
                tap.0 = tap.0.min(x);
                tap.1 = tap.1.max(x);
                x as f64
            }
        }
    }

    fn read_sequence(&mut self, path: &str, duration: f64, events: &[SeqEvent], t: f64) -> f64 {
        // Latest event at or before t; later list entries win ties
        let current = events
            .iter()
            .filter(|e| e.time <= t)
            .fold(None::<&SeqEvent>, |best, e| match best {
                Some(b) if b.time > e.time => Some(b),
                _ => Some(e),
            });
        let Some(event) = current.filter(|e| e.value >= 0.5) else {
            return 0.0;
        };

        let offset = t - event.time;
        if offset >= duration {
            return 0.0;
        }

        let Some(buffer) = self.files.get(path) else {
            if self.reported_missing.insert(path.to_string()) {
                self.events
                    .push(RendererEvent::Error(format!("no buffer at path '{}'", path)));
            }
            return 0.0;
        };

        let index = (offset * buffer.sample_rate as f64).floor();
        if index < 0.0 {
            return 0.0;
        }
        buffer
            .samples
            .get(index as usize)
            .map(|&s| s as f64)
            .unwrap_or(0.0)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            return Err(MixgraphError::Renderer {
                reason: "renderer has been released".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Renderer for OfflineRenderer {
    async fn initialize(&mut self, config: IoConfig) -> Result<RendererInfo> {
        if self.fail_initialization {
            return Err(MixgraphError::Initialization {
                reason: "offline renderer configured to fail".to_string(),
            });
        }
        self.ensure_open()?;
        if let Some(rate) = config.sample_rate {
            if rate == 0 {
                return Err(MixgraphError::Config {
                    reason: "sample rate must be positive".to_string(),
                });
            }
            self.sample_rate = rate;
        }
        self.initialized = true;
        info!(sample_rate = self.sample_rate, "offline renderer initialized");
        Ok(RendererInfo {
            sample_rate: self.sample_rate,
        })
    }

    fn render(&mut self, graph: StereoGraph) {
        if self.released {
            return;
        }
        self.dsp.retain_for(&graph);
        self.reported_missing.clear();
        self.graph = graph;
        self.render_count += 1;
    }

    async fn update_virtual_file_system(
        &mut self,
        buffers: HashMap<String, ChannelBuffer>,
    ) -> Result<()> {
        self.ensure_open()?;
        debug!(paths = buffers.len(), "publishing sample buffers");
        self.files.extend(buffers);
        Ok(())
    }

    async fn prune_virtual_file_system(&mut self, released_keys: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.files.retain(|path, _| {
            let key = path.rsplit_once(':').map(|(key, _)| key).unwrap_or(path);
            !released_keys.iter().any(|released| released == key)
        });
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.time_origin + self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn resume(&mut self) {
        self.resumed = !self.released;
    }

    fn release(&mut self) {
        self.released = true;
        self.resumed = false;
        self.files.clear();
        self.graph = StereoGraph::silence();
    }

    fn drain_events(&mut self) -> Vec<RendererEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Frames rendered per block while bouncing
const BOUNCE_BLOCK_FRAMES: usize = 512;

/// Render `duration` seconds of the engine's arrangement starting at `start`
///
/// Plays the transport from `start`, renders block by block (ticking the
/// engine between blocks so meters and playhead subscribers run as they
/// would live), then stops.
pub fn bounce(
    engine: &mut AudioEngine<OfflineRenderer>,
    start: f64,
    duration: f64,
) -> Result<AudioBuffer> {
    if !engine.is_initialized() {
        return Err(MixgraphError::NotInitialized);
    }
    if !duration.is_finite() || duration < 0.0 || !start.is_finite() {
        return Err(MixgraphError::Config {
            reason: format!("invalid bounce span: start {} duration {}", start, duration),
        });
    }

    let sample_rate = engine.get_sample_rate();
    let total = (duration * sample_rate as f64).round() as usize;
    let mut out = AudioBuffer::new(total, ChannelLayout::Stereo, sample_rate);

    engine.stop();
    engine.set_playhead(start);
    engine.play();

    let mut written = 0;
    while written < total {
        let frames = BOUNCE_BLOCK_FRAMES.min(total - written);
        let block = engine.renderer_mut().render_block(frames);
        for channel in 0..2 {
            out.channel_mut(channel)[written..written + frames].copy_from_slice(block.channel(channel));
        }
        written += frames;
        engine.tick();
    }

    engine.stop();
    info!(start, duration, frames = total, peak_db = out.peak_db(), "bounce complete");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::{constant, ge, meter, mul, sample_seq, smooth, sub, time};
    use approx::assert_relative_eq;

    fn ramp(len: usize, sample_rate: u32) -> ChannelBuffer {
        ChannelBuffer {
            samples: (0..len).map(|i| i as f32 / len as f32).collect::<Vec<_>>().into(),
            sample_rate,
        }
    }

    fn mono(graph: NodeRef) -> StereoGraph {
        StereoGraph {
            left: graph.clone(),
            right: graph,
        }
    }

    #[test]
    fn test_sequence_reads_from_trigger() {
        let mut renderer = OfflineRenderer::new();
        renderer.files.insert("k:0".into(), ramp(100, 100));
        renderer.render(mono(sample_seq(
            "k:0",
            1.0,
            vec![SeqEvent::trigger(0.5), SeqEvent::stop(1.2)],
            time(),
        )));

        assert_eq!(renderer.evaluate_at(0.4).0, 0.0);
        assert_relative_eq!(renderer.evaluate_at(0.5).0, 0.0);
        assert_relative_eq!(renderer.evaluate_at(0.75).0, 0.25);
        assert_eq!(renderer.evaluate_at(1.3).0, 0.0);
    }

    #[test]
    fn test_gate_mutes_preroll() {
        let mut renderer = OfflineRenderer::new();
        renderer.files.insert(
            "k:0".into(),
            ChannelBuffer {
                samples: vec![1.0; 1000].into(),
                sample_rate: 100,
            },
        );
        let tt = sub(time(), constant(0.0));
        let seq = sample_seq(
            "k:0",
            10.0,
            vec![SeqEvent::trigger(0.5), SeqEvent::stop(3.0)],
            tt.clone(),
        );
        renderer.render(mono(mul(vec![ge(tt, constant(1.0)), seq])));

        assert_eq!(renderer.evaluate_at(0.7).0, 0.0);
        assert_eq!(renderer.evaluate_at(1.5).0, 1.0);
        assert_eq!(renderer.evaluate_at(3.5).0, 0.0);
    }

    #[test]
    fn test_missing_path_reports_once() {
        let mut renderer = OfflineRenderer::new();
        renderer.render(mono(sample_seq("gone:0", 1.0, vec![SeqEvent::trigger(0.0)], time())));
        renderer.evaluate_at(0.1);
        renderer.evaluate_at(0.2);

        let errors: Vec<_> = renderer
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, RendererEvent::Error(_)))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_smooth_glides_across_rebuilds() {
        let mut renderer = OfflineRenderer::new();
        renderer.render(mono(smooth("g", 0.02, constant(1.0))));
        assert_eq!(renderer.evaluate_at(0.0).0, 1.0);

        renderer.render(mono(smooth("g", 0.02, constant(0.0))));
        let first = renderer.evaluate_at(0.0).0;
        assert!(first > 0.99 && first < 1.0, "expected a glide, got {}", first);

        // 0.2 s is ten time constants
        let settled = renderer.render_block(8820);
        assert!(settled.channel(0)[8819] < 1e-3);
    }

    #[test]
    fn test_new_smoother_key_starts_at_target() {
        let mut renderer = OfflineRenderer::new();
        renderer.render(mono(smooth("a", 0.02, constant(1.0))));
        renderer.evaluate_at(0.0);

        renderer.render(mono(smooth("b", 0.02, constant(0.25))));
        assert_eq!(renderer.evaluate_at(0.0).0, 0.25);

        // "a" left the graph, so its state is gone when it comes back
        renderer.render(mono(smooth("a", 0.02, constant(0.5))));
        assert_eq!(renderer.evaluate_at(0.0).0, 0.5);
    }

    #[test]
    fn test_render_block_advances_clock_and_meters() {
        let mut renderer = OfflineRenderer::new();
        renderer.render(mono(meter("tap", sub(time(), constant(0.0)))));
        let block = renderer.render_block(441);

        assert_eq!(block.len(), 441);
        assert_relative_eq!(renderer.current_time(), 0.01, epsilon = 1e-12);

        let meters: Vec<_> = renderer
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                RendererEvent::Meter { source, min, max } => Some((source, min, max)),
                _ => None,
            })
            .collect();
        assert_eq!(meters.len(), 1);
        assert_eq!(meters[0].0, "tap");
        assert_eq!(meters[0].1, 0.0);
        assert!(meters[0].2 > 0.0099);
    }

    #[tokio::test]
    async fn test_prune_removes_all_channels_of_key() {
        let mut renderer = OfflineRenderer::new();
        let mut buffers = HashMap::new();
        buffers.insert("a:0".to_string(), ramp(4, 100));
        buffers.insert("a:1".to_string(), ramp(4, 100));
        buffers.insert("b:0".to_string(), ramp(4, 100));
        renderer.update_virtual_file_system(buffers).await.unwrap();

        renderer
            .prune_virtual_file_system(&["a".to_string()])
            .await
            .unwrap();
        assert_eq!(renderer.paths(), vec!["b:0"]);
    }

    #[tokio::test]
    async fn test_failing_initialization() {
        let mut renderer = OfflineRenderer::failing();
        let err = renderer.initialize(IoConfig::default()).await.unwrap_err();
        assert!(matches!(err, MixgraphError::Initialization { .. }));
        assert!(!renderer.is_initialized());

        renderer.set_fail_initialization(false);
        let info = renderer
            .initialize(IoConfig {
                sample_rate: Some(48000),
                output_channels: 2,
            })
            .await
            .unwrap();
        assert_eq!(info.sample_rate, 48000);
    }

    #[tokio::test]
    async fn test_released_rejects_updates() {
        let mut renderer = OfflineRenderer::new();
        renderer.release();
        assert!(renderer
            .update_virtual_file_system(HashMap::new())
            .await
            .is_err());
    }
}
