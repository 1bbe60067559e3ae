//! Audio file I/O for Mixgraph
//!
//! Fetching raw bytes for the sample store, decoding WAV data into
//! [`AudioBuffer`]s, and writing bounces back out. Decoded audio keeps its
//! native sample rate; the sample store records it per entry.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sha2::{Digest, Sha256};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{MixgraphError, Result};

// ============================================================================
// Sources
// ============================================================================

/// Where the encoded bytes for a sample store entry come from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    /// A file on the local filesystem
    Path(PathBuf),
    /// An http(s) URL (requires the `http-source` feature)
    Url(String),
    /// Encoded bytes already in memory
    Bytes(Arc<[u8]>),
}

impl SourceRef {
    /// Wrap encoded bytes
    pub fn bytes(data: impl Into<Arc<[u8]>>) -> Self {
        SourceRef::Bytes(data.into())
    }
}

impl From<PathBuf> for SourceRef {
    fn from(path: PathBuf) -> Self {
        SourceRef::Path(path)
    }
}

impl From<&Path> for SourceRef {
    fn from(path: &Path) -> Self {
        SourceRef::Path(path.to_path_buf())
    }
}

/// Fetches encoded audio bytes for the sample store
///
/// Implementations may suspend on network or disk I/O. A fetch error must
/// not leave anything behind; the store only caches after a successful
/// fetch *and* decode.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch the encoded bytes for `key` from `source`
    async fn fetch(&self, key: &str, source: &SourceRef) -> Result<Vec<u8>>;
}

/// Default source: local files through tokio, URLs through reqwest
#[derive(Debug, Clone, Default)]
pub struct DefaultSampleSource {
    #[cfg(feature = "http-source")]
    client: reqwest::Client,
}

impl DefaultSampleSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SampleSource for DefaultSampleSource {
    async fn fetch(&self, key: &str, source: &SourceRef) -> Result<Vec<u8>> {
        match source {
            SourceRef::Path(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(MixgraphError::FileNotFound {
                        path: path.display().to_string(),
                        source: Some(e),
                    })
                }
                Err(e) => Err(MixgraphError::Fetch {
                    key: key.to_string(),
                    reason: format!("Failed to read {}", path.display()),
                    source: Some(Box::new(e)),
                }),
            },
            SourceRef::Url(url) => self.fetch_url(key, url).await,
            SourceRef::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }
}

impl DefaultSampleSource {
    #[cfg(feature = "http-source")]
    async fn fetch_url(&self, key: &str, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |e: reqwest::Error| MixgraphError::Fetch {
            key: key.to_string(),
            reason: format!("GET {} failed", url),
            source: Some(Box::new(e)),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?;
        let bytes = response.bytes().await.map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "http-source"))]
    async fn fetch_url(&self, key: &str, url: &str) -> Result<Vec<u8>> {
        Err(MixgraphError::Fetch {
            key: key.to_string(),
            reason: format!("cannot fetch {}: built without the http-source feature", url),
            source: None,
        })
    }
}

/// Derive an opaque content key (hex SHA-256) for encoded audio bytes
pub fn content_key(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode WAV bytes into an [`AudioBuffer`] at the file's own sample rate
///
/// # Errors
/// * `InvalidAudio` - If the bytes are not a readable WAV stream
/// * `UnsupportedFormat` - More than two channels, or an odd bit depth
/// * `EmptyAudio` - The file holds zero frames
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| MixgraphError::InvalidAudio {
        reason: format!("Failed to open WAV stream: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
        MixgraphError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        }
    })?;

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let buffer = AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)?;

    if buffer.is_empty() {
        return Err(MixgraphError::EmptyAudio);
    }

    Ok(buffer)
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    fn invalid(bits: &str, e: hound::Error) -> MixgraphError {
        MixgraphError::InvalidAudio {
            reason: format!("Failed to read {} samples: {}", bits, e),
            source: Some(Box::new(e)),
        }
    }

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| invalid("float", e)),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("8-bit", e)),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("16-bit", e)),
            // 24-bit stored as i32 in hound
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("24-bit", e)),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("32-bit int", e)),
            _ => Err(MixgraphError::UnsupportedFormat {
                format: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

// ============================================================================
// Encoding
// ============================================================================

fn wav_spec(buffer: &AudioBuffer, bit_depth: u16) -> Result<WavSpec> {
    if !matches!(bit_depth, 16 | 24 | 32) {
        return Err(MixgraphError::UnsupportedFormat {
            format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
        });
    }
    Ok(WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    })
}

fn write_samples<W: std::io::Write + std::io::Seek>(
    mut writer: WavWriter<W>,
    buffer: &AudioBuffer,
    bit_depth: u16,
) -> std::result::Result<(), hound::Error> {
    for sample in buffer.to_interleaved() {
        match bit_depth {
            16 => writer.write_sample((sample * 32767.0).clamp(-32768.0, 32767.0) as i16)?,
            24 => writer.write_sample((sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32)?,
            _ => writer.write_sample(sample)?,
        }
    }
    writer.finalize()
}

fn hound_io_error(e: hound::Error) -> MixgraphError {
    match e {
        hound::Error::IoError(io) => MixgraphError::Io(io),
        other => MixgraphError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Encode a buffer as an in-memory WAV file
pub fn encode_wav(buffer: &AudioBuffer, bit_depth: u16) -> Result<Vec<u8>> {
    let spec = wav_spec(buffer, bit_depth)?;
    let mut cursor = Cursor::new(Vec::new());
    let writer = WavWriter::new(&mut cursor, spec).map_err(hound_io_error)?;
    write_samples(writer, buffer, bit_depth).map_err(hound_io_error)?;
    Ok(cursor.into_inner())
}

/// Write a buffer to a WAV file at its own sample rate
pub fn export_wav(buffer: &AudioBuffer, path: &Path, bit_depth: u16) -> Result<()> {
    let spec = wav_spec(buffer, bit_depth)?;
    let writer = WavWriter::create(path, spec).map_err(hound_io_error)?;
    write_samples(writer, buffer, bit_depth).map_err(hound_io_error)
}

/// Generate a mono sine test tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(440.0, 1.0, 48000);
        assert_eq!(buffer.len(), 48000);
        assert_eq!(buffer.channels(), 1);

        // Half a cycle in, the sine is back near zero
        let zero_crossing = (48000.0 / 440.0 / 2.0) as usize;
        assert!(buffer.samples[0][zero_crossing].abs() < 0.1);
    }

    #[test]
    fn test_encode_decode_keeps_sample_rate() {
        let original = generate_test_tone(440.0, 0.25, 22050);
        let bytes = encode_wav(&original, 24).unwrap();
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.channel(0).iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() < 0.001, "Sample mismatch: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_decode_stereo_16bit() {
        let interleaved: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.5 } else { -0.25 }).collect();
        let original = AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, 44100).unwrap();
        let decoded = decode_wav(&encode_wav(&original, 16).unwrap()).unwrap();

        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.len(), 100);
        assert!((decoded.channel(0)[10] - 0.5).abs() < 0.001);
        assert!((decoded.channel(1)[10] + 0.25).abs() < 0.001);
    }

    #[test]
    fn test_decode_garbage_is_invalid_audio() {
        let result = decode_wav(b"definitely not a wav file");
        assert!(matches!(result, Err(MixgraphError::InvalidAudio { .. })));
    }

    #[test]
    fn test_decode_empty_wav() {
        let empty = AudioBuffer::new(0, ChannelLayout::Mono, 44100);
        let bytes = encode_wav(&empty, 16).unwrap();
        assert!(matches!(decode_wav(&bytes), Err(MixgraphError::EmptyAudio)));
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let tone = generate_test_tone(440.0, 0.1, 44100);
        assert!(matches!(
            encode_wav(&tone, 12),
            Err(MixgraphError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_export_wav_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(1000.0, 0.2, 48000);

        export_wav(&tone, &path, 32).unwrap();
        let decoded = decode_wav(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.len(), tone.len());
        assert!((decoded.channel(0)[7] - tone.channel(0)[7]).abs() < 1e-6);
    }

    #[test]
    fn test_content_key_is_stable_hex() {
        let a = content_key(b"abc");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_key(b"abc"));
        assert_ne!(a, content_key(b"abd"));
        assert!(a.starts_with("ba7816bf"));
    }

    #[tokio::test]
    async fn test_default_source_missing_file() {
        let source = DefaultSampleSource::new();
        let result = source
            .fetch("missing", &SourceRef::Path(PathBuf::from("/nonexistent/take.wav")))
            .await;
        match result {
            Err(MixgraphError::FileNotFound { path, .. }) => assert!(path.contains("nonexistent")),
            other => panic!("Expected FileNotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_source_bytes() {
        let source = DefaultSampleSource::new();
        let bytes = source
            .fetch("inline", &SourceRef::bytes(vec![1u8, 2, 3]))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
