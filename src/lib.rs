//! Mixgraph - Audio Graph Orchestration Engine
//!
//! Mixgraph sits between a multitrack editor and a real-time audio renderer.
//! It never processes audio on the control path; instead it:
//! 1. Keeps decoded sample buffers in a virtual sample store
//! 2. Runs a transport clock mapped onto the renderer's clock
//! 3. Recompiles the whole mix into a declarative signal graph on every change
//!
//! # Architecture
//!
//! - `engine::AudioEngine` is the facade hosts talk to
//! - `engine::GraphCompiler` turns tracks, clips and transport into a graph
//! - `engine::Renderer` is the seam to whatever actually makes sound
//! - `engine::OfflineRenderer` evaluates graphs in software for bounces and tests

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;

pub use config::{EngineConfig, Session};
pub use engine::{AudioEngine, OfflineRenderer, Renderer};
pub use error::{MixgraphError, Result};
