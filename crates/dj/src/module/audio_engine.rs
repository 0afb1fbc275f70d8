//! cpal output for the main and headphone buses.
//!
//! The main mix is written to one channel pair and the cue mix to another
//! pair of the same device, so a four-channel interface gives the audience
//! and the headphones separate feeds. A plain stereo device carries only
//! the main mix.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, Stream, StreamConfig};

use super::engine::SharedMixer;
use crate::config::EngineConfig;

/// Where and how the buses are played.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Substring of the device name; empty selects the system default.
    pub device_name: String,
    pub sample_rate: u32,
    /// Device channels (left, right) for the main bus.
    pub main_pair: (u16, u16),
    /// Device channels (left, right) for the cue bus.
    pub cue_pair: (u16, u16),
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for OutputConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            device_name: config.device_name.clone(),
            sample_rate: config.sample_rate,
            main_pair: config.main_channels,
            cue_pair: config.cue_channels,
        }
    }
}

impl OutputConfig {
    /// Device channel count that fits both pairs.
    fn channels_needed(&self) -> u16 {
        let (a, b) = self.main_pair;
        let (c, d) = self.cue_pair;
        a.max(b).max(c).max(d) + 1
    }
}

/// Renders a [`SharedMixer`] from the device callback.
pub struct DjAudioEngine {
    config: OutputConfig,
    mixer: SharedMixer,
    stream: Option<Stream>,
    device_channels: u16,
}

impl DjAudioEngine {
    pub fn new(config: OutputConfig, mixer: SharedMixer) -> Self {
        Self {
            config,
            mixer,
            stream: None,
            device_channels: 2,
        }
    }

    /// Open the output device and start pulling frames from the mixer.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let host = cpal::default_host();
        let device = select_device(&host, &self.config.device_name)?;
        let stream_config = select_stream_config(
            &device,
            self.config.channels_needed(),
            self.config.sample_rate,
        )?;

        self.device_channels = stream_config.channels;
        log::info!(
            "Opening output: {} channels @ {} Hz (cue bus {})",
            stream_config.channels,
            stream_config.sample_rate,
            if self.has_cue_output() { "routed" } else { "not routed" }
        );
        if stream_config.sample_rate != self.config.sample_rate {
            self.mixer.lock().set_output_rate(stream_config.sample_rate);
        }

        let mixer = SharedMixer::clone(&self.mixer);
        let (main_pair, cue_pair) = (self.config.main_pair, self.config.cue_pair);
        let width = stream_config.channels as usize;

        let stream = device.build_output_stream(
            &stream_config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                out.fill(0.0);
                let mut core = mixer.lock();
                for frame in out.chunks_mut(width) {
                    let (main, cue) = core.next_frame();
                    route(frame, main_pair, main);
                    route(frame, cue_pair, cue);
                }
            },
            |err| log::error!("Output stream error: {}", err),
            None,
        )?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the stream. The mixer keeps its state.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Output closed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn device_channels(&self) -> u16 {
        self.device_channels
    }

    /// Whether the open device has room for the cue pair.
    pub fn has_cue_output(&self) -> bool {
        self.device_channels >= self.config.channels_needed()
    }
}

impl Drop for DjAudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// First device whose name contains `name`, else the default device.
fn select_device(host: &Host, name: &str) -> anyhow::Result<Device> {
    if !name.is_empty() {
        let found = host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|n| n.contains(name)));
        match found {
            Some(device) => return Ok(device),
            None => log::warn!("No output device matching '{}', using the default", name),
        }
    }
    host.default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device available"))
}

/// An f32 config wide enough for both buses at `rate`, else the default.
fn select_stream_config(device: &Device, channels: u16, rate: u32) -> anyhow::Result<StreamConfig> {
    let wide_enough = device.supported_output_configs()?.find(|range| {
        range.channels() >= channels
            && range.sample_format() == SampleFormat::F32
            && (range.min_sample_rate()..=range.max_sample_rate()).contains(&rate)
    });
    if let Some(range) = wide_enough {
        return Ok(range.with_sample_rate(rate).into());
    }

    let fallback = device.default_output_config()?;
    log::warn!(
        "No {}-channel f32 config at {} Hz; falling back to {} channels @ {} Hz",
        channels,
        rate,
        fallback.channels(),
        fallback.sample_rate()
    );
    Ok(fallback.into())
}

/// Write a stereo pair into a device frame; channels past the frame are dropped.
#[inline]
fn route(frame: &mut [f32], (left_ch, right_ch): (u16, u16), (left, right): (f32, f32)) {
    if let Some(slot) = frame.get_mut(left_ch as usize) {
        *slot = left;
    }
    if let Some(slot) = frame.get_mut(right_ch as usize) {
        *slot = right;
    }
}

/// An output device as seen by the host.
#[derive(Debug, Clone)]
pub struct OutputDevice {
    pub name: String,
    /// Widest channel count among its configs.
    pub channels: u16,
    pub is_default: bool,
}

/// Output devices of the default host.
pub fn output_devices() -> Vec<OutputDevice> {
    let host = cpal::default_host();
    let default = default_output_name().unwrap_or_default();
    let Ok(devices) = host.output_devices() else {
        return Vec::new();
    };

    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let channels = device
                .supported_output_configs()
                .ok()
                .and_then(|ranges| ranges.map(|r| r.channels()).max())
                .unwrap_or(2);
            Some(OutputDevice {
                is_default: name == default,
                name,
                channels,
            })
        })
        .collect()
}

pub fn default_output_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_config_from_engine_config() {
        let config = OutputConfig::default();
        assert_eq!(config.main_pair, (0, 1));
        assert_eq!(config.cue_pair, (2, 3));
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels_needed(), 4);
    }

    #[test]
    fn test_route_drops_missing_channels() {
        let mut stereo = [0.0f32; 2];
        route(&mut stereo, (0, 1), (0.5, -0.5));
        route(&mut stereo, (2, 3), (0.9, 0.9));
        assert_eq!(stereo, [0.5, -0.5]);

        let mut quad = [0.0f32; 4];
        route(&mut quad, (2, 3), (0.25, 0.75));
        assert_eq!(quad, [0.0, 0.0, 0.25, 0.75]);
    }

    #[test]
    fn test_output_devices_without_hardware() {
        // Headless machines report an empty list
        for device in output_devices() {
            assert!(!device.name.is_empty());
        }
    }
}
