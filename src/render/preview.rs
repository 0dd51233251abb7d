//! Parameter preview
//!
//! Stand-in for the external shader: reads only the named parameters and
//! the frame time, never the feature vector.

use eframe::egui::{self, Color32, Pos2, Stroke, Vec2};

use super::bridge::RenderParameters;

/// Draw a pulsing disc driven by `scale`, `roughness` and `frequency`
pub fn show(ui: &mut egui::Ui, params: &RenderParameters, height: f32) -> egui::Response {
    let size = Vec2::new(ui.available_width(), height);
    let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
    let rect = response.rect;

    let level = (params.get("frequency").unwrap_or(0.0).clamp(0.0, 1.0) * 255.0) as u8;
    painter.rect_filled(rect, 4.0, Color32::from_gray(level));

    let scale = params.get("scale").unwrap_or(0.0).max(0.0);
    let roughness = params.get("roughness").unwrap_or(0.0).clamp(0.0, 1.0);
    let radius = rect.height() * 0.2 * scale;
    if radius < 0.5 {
        return response;
    }

    // Outline wobble grows with roughness and drifts with time
    let segments = 96;
    let points: Vec<Pos2> = (0..=segments)
        .map(|i| {
            let a = i as f32 / segments as f32 * std::f32::consts::TAU;
            let wobble = 1.0 + roughness * 0.15 * (a * 7.0 + params.time * 2.0).sin();
            rect.center() + Vec2::angled(a) * radius * wobble
        })
        .collect();

    painter.add(egui::Shape::line(
        points,
        Stroke::new(2.0, Color32::from_rgb(170, 169, 173)),
    ));

    response
}
