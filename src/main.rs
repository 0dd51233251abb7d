//! pulse-rs - Audio-reactive visual driver
//!
//! Samples a live input device every display frame, reduces its spectrum to
//! a small feature vector and feeds that vector to a parameter bridge for
//! the renderer and to a bar overlay.

use eframe::egui;

mod audio;
mod error;
mod features;
mod pipeline;
mod render;
mod scheduler;
mod settings;

use audio::CpalBackend;
use pipeline::Visualizer;
use render::{RenderParameterBridge, WaveformOverlay};
use scheduler::{FrameClock, RepaintRequester, SchedulerState};
use settings::AppSettings;

fn main() -> eframe::Result<()> {
    env_logger::init();
    log::info!("Starting pulse-rs");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_title("pulse-rs"),
        ..Default::default()
    };

    eframe::run_native(
        "pulse-rs",
        options,
        Box::new(|cc| Ok(Box::new(PulseApp::new(cc)?))),
    )
}

struct PulseApp {
    settings: AppSettings,
    visualizer: Visualizer<CpalBackend, RepaintRequester>,
    bridge: RenderParameterBridge,
    overlay: WaveformOverlay,
    clock: FrameClock,
}

impl PulseApp {
    fn new(cc: &eframe::CreationContext<'_>) -> Result<Self, error::PipelineError> {
        let settings = AppSettings::load();

        let mut backend = CpalBackend::new();
        if let Some(name) = &settings.device {
            if !backend.select_by_name(name) {
                log::warn!("Saved input device '{}' not found", name);
            }
        }
        backend.gain = settings.gain;
        backend.sync_gain();

        let visualizer = Visualizer::new(
            backend,
            RepaintRequester::new(cc.egui_ctx.clone()),
            settings.analyzer,
            settings.bin_count,
        )?;
        let bridge = RenderParameterBridge::new(settings.parameters.clone(), settings.bin_count)?;
        let overlay = WaveformOverlay::new(settings.overlay);

        Ok(Self {
            settings,
            visualizer,
            bridge,
            overlay,
            clock: FrameClock::new(),
        })
    }

    fn toggle(&mut self) {
        match self.visualizer.toggle() {
            Ok(()) if !self.visualizer.is_connected() => self.overlay.clear(),
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {}
            Err(e) => log::error!("Toggle failed: {}", e),
        }
    }

    fn run_frame(&mut self) {
        let Some(handle) = self.visualizer.pending_frame() else {
            return;
        };
        let now = self.clock.now();
        if let Err(e) = self
            .visualizer
            .on_frame(handle, now, &mut [&mut self.bridge, &mut self.overlay])
        {
            // Only reachable when startup validation was bypassed
            log::error!("Frame tick failed: {}", e);
            panic!("frame tick failed: {}", e);
        }
    }

    fn save_settings(&mut self) {
        let backend = self.visualizer.connection().backend();
        self.settings.device = backend.selected_name().map(str::to_string);
        self.settings.gain = backend.gain;
        self.settings.save();
    }
}

impl Drop for PulseApp {
    fn drop(&mut self) {
        self.visualizer.disconnect();
    }
}

impl eframe::App for PulseApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.run_frame();

        // Top panel
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("pulse-rs");
                ui.separator();

                let connected = self.visualizer.is_connected();
                let mut selection_changed = false;
                {
                    let backend = self.visualizer.connection_mut().backend_mut();
                    ui.add_enabled_ui(!connected, |ui| {
                        egui::ComboBox::from_id_salt("device")
                            .selected_text(backend.selected_name().unwrap_or("None").to_string())
                            .show_ui(ui, |ui| {
                                for (i, name) in backend.devices.iter().enumerate() {
                                    selection_changed |= ui
                                        .selectable_value(&mut backend.selected_device, i, name)
                                        .changed();
                                }
                            });
                        if ui.button("⟳").on_hover_text("Rescan devices").clicked() {
                            backend.scan_devices();
                        }
                    });
                }
                if selection_changed {
                    self.save_settings();
                }

                ui.separator();

                let button_text = if connected { "⏹ Stop" } else { "▶ Start" };
                let enabled =
                    !self.visualizer.connection().backend().devices.is_empty() || connected;
                if ui
                    .add_enabled(enabled, egui::Button::new(button_text))
                    .clicked()
                {
                    self.toggle();
                }

                ui.separator();
                let connection = self.visualizer.connection();
                match &connection.backend().active_device {
                    Some(name) if connection.is_connected() => {
                        ui.label(format!("{}: {}", connection.status, name));
                    }
                    _ => {
                        ui.label(&connection.status);
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.settings.show_parameters, "⚙ Parameters");
                });
            });
        });

        // Parameter panel
        if self.settings.show_parameters {
            egui::SidePanel::right("parameter_panel")
                .min_width(220.0)
                .show(ctx, |ui| {
                    ui.heading("Parameters");
                    ui.separator();

                    ui.collapsing("Audio", |ui| {
                        ui.horizontal(|ui| {
                            ui.label("Gain:");
                            let backend = self.visualizer.connection_mut().backend_mut();
                            let response = ui.add(
                                egui::Slider::new(&mut backend.gain, 0.1..=10.0).logarithmic(true),
                            );
                            if response.changed() {
                                backend.sync_gain();
                            }
                            if response.drag_stopped() {
                                self.save_settings();
                            }
                        });
                    });

                    ui.separator();

                    let params = self.bridge.latest();
                    egui::Grid::new("uniforms").striped(true).show(ui, |ui| {
                        ui.label("time");
                        ui.monospace(format!("{:.2}", params.time));
                        ui.end_row();
                        for mapping in self.bridge.mappings() {
                            ui.label(&mapping.name);
                            ui.monospace(format!(
                                "{:.3}  (slot {})",
                                params.get(&mapping.name).unwrap_or(0.0),
                                mapping.slot
                            ));
                            ui.end_row();
                        }
                    });
                });
        }

        // Preview and overlay
        egui::CentralPanel::default().show(ctx, |ui| {
            render::preview::show(ui, self.bridge.latest(), self.settings.preview_height);
            ui.add_space(8.0);
            self.overlay.show(ui);

            ui.with_layout(egui::Layout::bottom_up(egui::Align::LEFT), |ui| {
                ui.horizontal(|ui| {
                    let stats = self.visualizer.stats();
                    let state = match self.visualizer.scheduler_state() {
                        SchedulerState::Idle => "Idle",
                        SchedulerState::Running => "Running",
                    };
                    ui.small(format!("Loop: {} | Ticks: {}", state, stats.ticks));
                    ui.separator();
                    let analyzer = self.visualizer.analyzer();
                    ui.small(format!(
                        "Samples: {} | Overruns: {}",
                        analyzer.samples_received(),
                        analyzer.overruns()
                    ));
                    ui.separator();
                    ui.small(format!(
                        "Bins: {} | FFT: {}",
                        self.visualizer.bin_count(),
                        self.settings.analyzer.fft_size
                    ));
                });
            });
        });
    }
}
