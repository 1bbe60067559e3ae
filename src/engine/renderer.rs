//! External renderer interface
//!
//! The engine never touches audio hardware or runs DSP itself. It hands a
//! [`StereoGraph`] description and per-channel sample buffers to a
//! [`Renderer`], reads its clock, and drains the events it reports.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::graph::StereoGraph;
use crate::error::Result;

/// Requested output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoConfig {
    /// Preferred sample rate; the renderer may pick another
    pub sample_rate: Option<u32>,
    pub output_channels: u16,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            output_channels: 2,
        }
    }
}

/// What the renderer actually opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererInfo {
    pub sample_rate: u32,
}

/// One channel of decoded audio, published under a file-system path
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBuffer {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

/// Asynchronous report from the renderer
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// Non-fatal internal failure
    Error(String),
    /// Level reading from a meter tap
    Meter { source: String, min: f32, max: f32 },
}

/// A graph renderer (audio device backend, offline bouncer, test double)
#[async_trait]
pub trait Renderer: Send {
    /// Open the output; reports the sample rate in use
    async fn initialize(&mut self, config: IoConfig) -> Result<RendererInfo>;

    /// Replace the entire active graph
    fn render(&mut self, graph: StereoGraph);

    /// Publish sample buffers, keyed by channel path
    async fn update_virtual_file_system(
        &mut self,
        buffers: HashMap<String, ChannelBuffer>,
    ) -> Result<()>;

    /// Forget every channel path belonging to the released sample keys
    async fn prune_virtual_file_system(&mut self, released_keys: &[String]) -> Result<()>;

    /// Renderer clock in seconds
    fn current_time(&self) -> f64;

    /// Resume output if it was suspended
    fn resume(&mut self);

    /// Close the output; the renderer is unusable afterwards
    fn release(&mut self);

    /// Take every event reported since the last call
    fn drain_events(&mut self) -> Vec<RendererEvent>;
}
