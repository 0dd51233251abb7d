//! Audio module - device connection, sample transport and spectral analysis
//!
//! This module provides:
//! - Lock-free sample channel from the capture thread
//! - Device connection lifecycle over a capture backend
//! - Byte spectrum sampling of the most recent window

mod analyzer;
mod buffer;
mod input;

pub use analyzer::{AnalyzerConfig, AnalyzerState, SpectrumSampler};
pub use input::{CaptureBackend, ConnectionState, CpalBackend, DeviceConnection};

#[cfg(test)]
pub(crate) use input::tests::FakeBackend;
