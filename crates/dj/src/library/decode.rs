//! Audio decoding to in-memory PCM.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DjError, Result};

/// Decoded audio, interleaved, one or two channels.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples normalized to -1.0..1.0.
    pub samples: Arc<Vec<f32>>,
    /// 1 (mono) or 2 (stereo).
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            channels: channels.clamp(1, 2),
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average the channels down to mono.
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels {
            1 => self.samples.as_ref().clone(),
            _ => self
                .samples
                .chunks_exact(2)
                .map(|frame| (frame[0] + frame[1]) * 0.5)
                .collect(),
        }
    }

    /// Stereo sample pair at a frame index (mono is duplicated).
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        match self.channels {
            1 => {
                let s = self.samples.get(index).copied().unwrap_or(0.0);
                (s, s)
            }
            _ => {
                let base = index * 2;
                (
                    self.samples.get(base).copied().unwrap_or(0.0),
                    self.samples.get(base + 1).copied().unwrap_or(0.0),
                )
            }
        }
    }
}

/// Source of decoded PCM for playback and analysis.
pub trait MediaDecoder: Send + Sync {
    /// Decode a file for playback.
    fn decode(&self, path: &Path) -> Result<DecodedAudio>;

    /// Decode a file to mono samples for analysis.
    fn decode_mono(&self, path: &Path) -> Result<(Vec<f32>, u32)> {
        let audio = self.decode(path)?;
        Ok((audio.to_mono(), audio.sample_rate))
    }
}

/// Decoder backed by symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl MediaDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        log::debug!("Decoding {:?}", path);

        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DjError::TrackNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                DjError::decode(path, e)
            }
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DjError::decode(path, e))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DjError::decode(path, "no audio track found"))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DjError::decode(path, "unknown sample rate"))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(2)
            .clamp(1, 2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DjError::decode(path, e))?;

        let mut samples = Vec::new();
        let mut decode_errors = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    log::warn!("Error reading packet from {:?}: {}", path, e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => append_samples(&mut samples, &decoded, channels),
                Err(e) => {
                    decode_errors += 1;
                    log::warn!("Error decoding {:?}: {}", path, e);
                }
            }
        }

        if samples.is_empty() {
            return Err(DjError::decode(
                path,
                format!("no audio decoded ({} packet errors)", decode_errors),
            ));
        }

        let audio = DecodedAudio::new(samples, channels, sample_rate);
        log::debug!(
            "Decoded {:?}: {} Hz, {} ch, {:.2}s",
            path,
            sample_rate,
            channels,
            audio.duration_seconds()
        );
        Ok(audio)
    }
}

/// Append decoded audio to an interleaved buffer of `channels` (1 or 2).
///
/// Sources with more channels keep their first two.
fn append_samples(samples: &mut Vec<f32>, decoded: &AudioBufferRef, channels: usize) {
    macro_rules! push_frames {
        ($buf:expr, $scale:expr) => {{
            let source_channels = $buf.spec().channels.count();
            for frame in 0..$buf.frames() {
                if channels == 1 || source_channels == 1 {
                    let mut sum = 0.0;
                    for ch in 0..source_channels {
                        sum += $scale($buf.chan(ch)[frame]);
                    }
                    let mono = sum / source_channels as f32;
                    samples.push(mono);
                    if channels == 2 {
                        samples.push(mono);
                    }
                } else {
                    samples.push($scale($buf.chan(0)[frame]));
                    samples.push($scale($buf.chan(1)[frame]));
                }
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => push_frames!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => push_frames!(buf, |s: f64| s as f32),
        AudioBufferRef::S16(buf) => push_frames!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => {
            push_frames!(buf, |s: symphonia::core::sample::i24| s.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::S32(buf) => push_frames!(buf, |s: i32| s as f32 / 2147483648.0),
        AudioBufferRef::U8(buf) => push_frames!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => {}
    }
}
