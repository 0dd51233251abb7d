//! Audio input device connection
//!
//! Owns the connected/disconnected state and the capture stream. Connecting
//! binds a fresh sample channel to the analyzer and starts the frame loop;
//! disconnecting stops the loop before the device is released.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::analyzer::AnalyzerState;
use super::buffer::{sample_channel, SampleConsumer, SampleProducer};
use crate::error::PipelineError;
use crate::scheduler::{FrameRequester, FrameScheduler};

/// Device connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Platform capture facility: one-shot request for an audio-only input
pub trait CaptureBackend {
    /// Live stream handle; capture ends when it is dropped
    type Stream;

    /// Open the input device and return its stream with the consumer end of
    /// a fresh sample channel whose window is `window_size` samples
    fn open_input(
        &mut self,
        window_size: usize,
    ) -> Result<(Self::Stream, SampleConsumer), PipelineError>;
}

/// Connection lifecycle around a capture backend
pub struct DeviceConnection<B: CaptureBackend> {
    backend: B,
    stream: Option<B::Stream>,
    state: ConnectionState,
    window_size: usize,

    /// Status message
    pub status: String,
}

impl<B: CaptureBackend> DeviceConnection<B> {
    /// `window_size` is the analyzer's FFT size
    pub fn new(backend: B, window_size: usize) -> Self {
        Self {
            backend,
            stream: None,
            state: ConnectionState::Disconnected,
            window_size,
            status: "Stopped".to_string(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Request the device, bind it to the analyzer and start the frame loop.
    ///
    /// On failure the connection stays disconnected and the loop idle.
    pub fn connect<R: FrameRequester>(
        &mut self,
        analyzer: &mut AnalyzerState,
        scheduler: &mut FrameScheduler<R>,
    ) -> Result<(), PipelineError> {
        if self.is_connected() {
            return Ok(());
        }

        log::info!("Requesting audio input...");

        let (stream, consumer) = match self.backend.open_input(self.window_size) {
            Ok(opened) => opened,
            Err(e) => {
                log::warn!("Audio input request failed: {}", e);
                self.status = format!("Error: {}", e);
                return Err(e);
            }
        };

        debug_assert!(!analyzer.is_bound(), "previous binding was not released");
        analyzer.bind(consumer);
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        self.status = "Capturing".to_string();
        log::info!("Audio input connected");

        scheduler.start(self.state())
    }

    /// Stop the frame loop and release the device. No-op when disconnected.
    pub fn disconnect<R: FrameRequester>(
        &mut self,
        analyzer: &mut AnalyzerState,
        scheduler: &mut FrameScheduler<R>,
    ) {
        if !self.is_connected() {
            return;
        }

        scheduler.stop();
        analyzer.unbind();
        drop(self.stream.take());
        self.state = ConnectionState::Disconnected;
        self.status = "Stopped".to_string();
        log::info!("Audio input disconnected");
    }

    /// Toggle connection state
    pub fn toggle<R: FrameRequester>(
        &mut self,
        analyzer: &mut AnalyzerState,
        scheduler: &mut FrameScheduler<R>,
    ) -> Result<(), PipelineError> {
        if self.is_connected() {
            self.disconnect(analyzer, scheduler);
            Ok(())
        } else {
            self.connect(analyzer, scheduler)
        }
    }
}

/// Capture through the system's default cpal host
pub struct CpalBackend {
    /// Available input devices
    pub devices: Vec<String>,

    /// Selected device index
    pub selected_device: usize,

    /// Gain multiplier (shared atomically with audio thread)
    gain_atomic: Arc<AtomicU32>,

    /// Gain value for UI binding
    pub gain: f32,

    /// Name of the device behind the current stream
    pub active_device: Option<String>,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        let mut backend = Self {
            devices: Vec::new(),
            selected_device: 0,
            gain_atomic: Arc::new(AtomicU32::new(1.0_f32.to_bits())),
            gain: 1.0,
            active_device: None,
        };
        backend.scan_devices();
        backend
    }

    /// Refresh the input device list, keeping the selection by name
    pub fn scan_devices(&mut self) {
        let previous = self.devices.get(self.selected_device).cloned();
        let host = cpal::default_host();
        self.devices = host
            .input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default();

        self.selected_device = previous
            .and_then(|name| self.devices.iter().position(|d| *d == name))
            .or_else(|| {
                let default_name = host.default_input_device().and_then(|d| d.name().ok())?;
                self.devices.iter().position(|d| *d == default_name)
            })
            .unwrap_or(0);

        log::info!("Found {} input device(s)", self.devices.len());
    }

    /// Select a device by name; returns false if it is not present
    pub fn select_by_name(&mut self, name: &str) -> bool {
        match self.devices.iter().position(|d| d == name) {
            Some(index) => {
                self.selected_device = index;
                true
            }
            None => false,
        }
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.devices.get(self.selected_device).map(String::as_str)
    }

    /// Sync the UI gain value to the audio thread
    pub fn sync_gain(&self) {
        self.gain_atomic.store(self.gain.to_bits(), Ordering::Relaxed);
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device, PipelineError> {
        let wanted = self.selected_name();
        let devices = host
            .input_devices()
            .map_err(|e| PipelineError::from_device_message(e.to_string()))?;

        for device in devices {
            if wanted.is_none() || device.name().ok().as_deref() == wanted {
                return Ok(device);
            }
        }

        Err(PipelineError::DeviceUnavailable(match wanted {
            Some(name) => format!("input device '{}' not found", name),
            None => "no input device found".to_string(),
        }))
    }
}

impl CaptureBackend for CpalBackend {
    type Stream = cpal::Stream;

    fn open_input(
        &mut self,
        window_size: usize,
    ) -> Result<(cpal::Stream, SampleConsumer), PipelineError> {
        let host = cpal::default_host();
        let device = self.find_device(&host)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let config = device
            .default_input_config()
            .map_err(|e| PipelineError::from_device_message(e.to_string()))?;

        log::info!("Audio config: {:?}", config);

        self.sync_gain();
        let gain = Arc::clone(&self.gain_atomic);
        let sample_format = config.sample_format();
        let config: cpal::StreamConfig = config.into();

        // Queue up to a second of audio so a stalled frame loop still
        // finds the latest window
        let (producer, consumer) = sample_channel(window_size, config.sample_rate.0 as usize);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, gain),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, gain),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, producer, gain),
            format => {
                return Err(PipelineError::DeviceUnavailable(format!(
                    "unsupported sample format {:?}",
                    format
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| PipelineError::from_device_message(e.to_string()))?;

        self.active_device = Some(device_name);
        Ok((stream, consumer))
    }
}

/// Build an input stream that downmixes each frame to mono
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: SampleProducer,
    gain: Arc<AtomicU32>,
) -> Result<cpal::Stream, PipelineError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let gain = f32::from_bits(gain.load(Ordering::Relaxed));
                for frame in data.chunks(channels) {
                    let sum: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum();
                    producer.push(sum / frame.len() as f32 * gain);
                }
            },
            |err| log::error!("Audio error: {}", err),
            None,
        )
        .map_err(|e| PipelineError::from_device_message(e.to_string()))
}
