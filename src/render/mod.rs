//! Render module - frame sinks for the renderer and the bar overlay

mod bridge;
mod overlay;
pub mod preview;

pub use bridge::{default_mappings, ParameterMapping, RenderParameterBridge, RenderParameters};
pub use overlay::{bar_rects, OverlaySettings, WaveformOverlay};
