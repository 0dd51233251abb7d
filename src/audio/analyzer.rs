//! Spectral analysis of the live input window
//!
//! Produces byte-scaled magnitude spectra the way browser analyser nodes do:
//! Blackman window, forward FFT, exponential smoothing over time, then a
//! linear map of the decibel range onto 0-255.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::buffer::SampleConsumer;
use crate::error::PipelineError;

/// Analyzer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// FFT window size in samples (power of 2)
    pub fft_size: usize,

    /// Weight of the previous frame in the magnitude average (0 = none)
    pub smoothing: f32,

    /// Magnitude mapped to byte 0
    pub min_decibels: f32,

    /// Magnitude mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyzerConfig {
    /// Number of frequency buckets in each spectrum
    pub fn spectrum_len(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(PipelineError::InvalidConfig(format!(
                "FFT size must be a power of 2 between 32 and 32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(PipelineError::InvalidConfig(format!(
                "Smoothing must be within 0..=1, got {}",
                self.smoothing
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(PipelineError::InvalidConfig(format!(
                "Decibel range is empty: {} >= {}",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }
}

/// Byte amplitudes, one per frequency bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSpectrum {
    bins: Vec<u8>,
}

impl RawSpectrum {
    pub fn as_slice(&self) -> &[u8] {
        &self.bins
    }

}

impl From<Vec<u8>> for RawSpectrum {
    fn from(bins: Vec<u8>) -> Self {
        Self { bins }
    }
}

/// Everything the sampler mutates between frames.
///
/// Holds the connection handle (the consumer side of the capture channel)
/// plus the analysis buffers, so the sampler itself stays immutable.
pub struct AnalyzerState {
    binding: Option<SampleConsumer>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    spectrum: RawSpectrum,
    passes: u64,
}

impl AnalyzerState {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            binding: None,
            window: vec![0.0; config.fft_size],
            scratch: vec![Complex::new(0.0, 0.0); config.fft_size],
            smoothed: vec![0.0; config.spectrum_len()],
            spectrum: RawSpectrum::from(vec![0; config.spectrum_len()]),
            passes: 0,
        }
    }

    /// Attach a freshly opened capture channel
    pub fn bind(&mut self, consumer: SampleConsumer) {
        self.window.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
        self.binding = Some(consumer);
    }

    /// Drop the capture channel; returns whether one was bound
    pub fn unbind(&mut self) -> bool {
        self.binding.take().is_some()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Number of completed analysis passes
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Total samples the capture thread has delivered on this binding
    pub fn samples_received(&self) -> u64 {
        self.binding
            .as_ref()
            .map(|c| c.samples_written())
            .unwrap_or(0)
    }

    /// Stale backlogs discarded on this binding
    pub fn overruns(&self) -> u64 {
        self.binding.as_ref().map(|c| c.overruns()).unwrap_or(0)
    }
}

/// FFT plan and window coefficients for one analyzer configuration
pub struct SpectrumSampler {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    coefficients: Vec<f32>,
}

impl SpectrumSampler {
    pub fn new(config: AnalyzerConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let coefficients = (0..config.fft_size)
            .map(|i| blackman_window(i, config.fft_size))
            .collect();

        Ok(Self {
            config,
            fft,
            coefficients,
        })
    }

    /// Run one analysis pass over the most recent window.
    ///
    /// Fails with `NotConnected` when no capture channel is bound.
    pub fn sample<'a>(
        &self,
        state: &'a mut AnalyzerState,
    ) -> Result<&'a RawSpectrum, PipelineError> {
        let consumer = state.binding.as_mut().ok_or(PipelineError::NotConnected)?;
        consumer.update();
        consumer.copy_window(&mut state.window);

        for ((slot, &sample), &w) in state
            .scratch
            .iter_mut()
            .zip(state.window.iter())
            .zip(self.coefficients.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut state.scratch);

        let tau = self.config.smoothing;
        let norm = 1.0 / self.config.fft_size as f32;
        let range = self.config.max_decibels - self.config.min_decibels;

        let bins = &mut state.spectrum.bins;
        bins.resize(self.config.spectrum_len(), 0);

        for ((byte, smoothed), value) in bins
            .iter_mut()
            .zip(state.smoothed.iter_mut())
            .zip(state.scratch.iter())
        {
            *smoothed = tau * *smoothed + (1.0 - tau) * value.norm() * norm;
            *byte = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (255.0 / range * (db - self.config.min_decibels))
                    .floor()
                    .clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        state.passes += 1;
        Ok(&state.spectrum)
    }
}

/// Blackman window coefficient
pub fn blackman_window(index: usize, size: usize) -> f32 {
    let x = 2.0 * PI * index as f32 / size as f32;
    0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
}
