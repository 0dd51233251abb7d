//! Feature bar overlay
//!
//! Draws the feature vector as outlined vertical bars on a fixed-size
//! surface. Bar height is proportional to `value / 255`.

use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::pipeline::{FeatureFrame, FrameSink};

/// Display settings for the overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub width: f32,
    pub height: f32,
    pub line_width: f32,
    pub color: [u8; 3],
    pub background: [u8; 3],
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            width: 1350.0,
            height: 300.0,
            line_width: 2.0,
            color: [255, 255, 255],
            background: [10, 10, 14],
        }
    }
}

/// Bar overlay fed by published frames
pub struct WaveformOverlay {
    pub settings: OverlaySettings,
    bars: Vec<u8>,
    /// Incremented whenever the bars change
    revision: u64,
    /// Bar geometry for (revision, surface) of the last paint
    geometry: Option<(u64, Rect, Vec<Rect>)>,
}

impl Default for WaveformOverlay {
    fn default() -> Self {
        Self::new(OverlaySettings::default())
    }
}

impl WaveformOverlay {
    pub fn new(settings: OverlaySettings) -> Self {
        Self {
            settings,
            bars: Vec::new(),
            revision: 0,
            geometry: None,
        }
    }

    /// Clear the bars (after disconnect)
    pub fn clear(&mut self) {
        if !self.bars.is_empty() {
            self.bars.clear();
            self.revision += 1;
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui) -> egui::Response {
        let available = ui.available_width();
        let scale = (available / self.settings.width).min(1.0);
        let size = Vec2::new(self.settings.width, self.settings.height) * scale;

        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;

        let [r, g, b] = self.settings.background;
        painter.rect_filled(rect, 0.0, Color32::from_rgb(r, g, b));

        let [r, g, b] = self.settings.color;
        let stroke = Stroke::new(self.settings.line_width, Color32::from_rgb(r, g, b));
        for &bar in self.layout(rect) {
            painter.rect_stroke(bar, 0.0, stroke);
        }

        response
    }

    /// Bars only get re-laid out when a new vector arrived or the surface moved
    fn layout(&mut self, rect: Rect) -> &[Rect] {
        let stale = !matches!(
            &self.geometry,
            Some((revision, cached, _)) if *revision == self.revision && *cached == rect
        );
        if stale {
            self.geometry = Some((self.revision, rect, bar_rects(&self.bars, rect)));
        }
        self.geometry
            .as_ref()
            .map(|(_, _, bars)| bars.as_slice())
            .unwrap_or(&[])
    }
}

impl FrameSink for WaveformOverlay {
    fn publish(&mut self, frame: &FeatureFrame) -> Result<(), PipelineError> {
        let slots = frame.vector.as_slice();
        if self.bars != slots {
            self.bars.clear();
            self.bars.extend_from_slice(slots);
            self.revision += 1;
        }
        Ok(())
    }
}

/// Screen rectangle of every bar, anchored to the bottom of `rect`
pub fn bar_rects(values: &[u8], rect: Rect) -> Vec<Rect> {
    if values.is_empty() {
        return Vec::new();
    }

    let slice_width = rect.width() / values.len() as f32;
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let h = value as f32 / 255.0 * rect.height();
            let x = rect.left() + i as f32 * slice_width;
            Rect::from_min_max(
                Pos2::new(x, rect.bottom() - h),
                Pos2::new(x + slice_width, rect.bottom()),
            )
        })
        .collect()
}
