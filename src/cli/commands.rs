//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use anyhow::{bail, Context};
use serde_json::json;
use tracing::{info, warn};

use crate::config::Session;
use crate::engine::io::{content_key, decode_wav, export_wav};
use crate::engine::offline::{bounce, OfflineRenderer};
use crate::engine::vfs::VfsEntry;
use crate::engine::AudioEngine;

/// Build an initialized offline engine with every session sample loaded
async fn load_session(path: &Path) -> anyhow::Result<(Session, AudioEngine<OfflineRenderer>)> {
    info!("Loading session: {}", path.display());
    let session = Session::from_json_file(path)
        .with_context(|| format!("failed to load session {}", path.display()))?;

    let mut engine = AudioEngine::with_config(OfflineRenderer::new(), session.config.clone());
    engine.initialize(Some(session.config.sample_rate)).await?;

    for (key, file) in &session.files {
        engine
            .load_audio_into_vfs(key, file.clone())
            .await
            .with_context(|| format!("failed to load sample '{}' from {}", key, file.display()))?;
    }

    let state = session.engine_state();
    engine.set_tracks(state.tracks);
    engine.set_clips(state.clips);
    engine.set_master_gain(state.master_gain);

    Ok((session, engine))
}

fn report_silenced(engine: &AudioEngine<OfflineRenderer>) {
    for clip in &engine.last_compile_report().silenced {
        warn!(
            "Clip '{}' ({}) is silent: {:?}",
            clip.clip_id, clip.file_id, clip.reason
        );
    }
}

/// Render a session span to a WAV file.
pub async fn bounce_session(
    path: &Path,
    output: &Path,
    start: f64,
    duration: Option<f64>,
    bit_depth: u16,
) -> anyhow::Result<()> {
    if !matches!(bit_depth, 16 | 24 | 32) {
        bail!("unsupported bit depth {}: use 16, 24 or 32", bit_depth);
    }

    let (session, mut engine) = load_session(path).await?;
    let duration = duration.unwrap_or_else(|| (session.length_secs() - start).max(0.0));

    let buffer = bounce(&mut engine, start, duration)?;
    report_silenced(&engine);

    export_wav(&buffer, output, bit_depth)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Bounced: {}", output.display());
    println!(
        "  {:.3}s from {:.3}s at {} Hz, {}-bit",
        buffer.duration_secs(),
        start,
        buffer.sample_rate,
        bit_depth
    );
    println!("  Peak: {:.1} dBFS", buffer.peak_db());

    engine.dispose();
    Ok(())
}

/// Print the graph a session compiles to while playing.
pub async fn print_graph(path: &Path) -> anyhow::Result<()> {
    let (_session, mut engine) = load_session(path).await?;
    engine.play();

    let output = json!({
        "graph": engine.renderer().graph(),
        "report": engine.last_compile_report(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    engine.dispose();
    Ok(())
}

/// Print the content key and decoded metadata of a WAV file.
pub fn inspect_file(path: &Path) -> anyhow::Result<()> {
    info!("Inspecting: {}", path.display());
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let buffer = decode_wav(&bytes)?;

    let entry = VfsEntry {
        channels: buffer.channels() as u16,
        duration: buffer.len() as u64,
        sample_rate: buffer.sample_rate,
    };
    let output = json!({
        "key": content_key(&bytes),
        "entry": entry,
        "durationSecs": entry.duration_secs(),
        "peakDb": buffer.peak_db(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
