//! Vitals View
//!
//! This module provides the view layer for the heart-rate measurement. It
//! renders the live camera session state: instructions, countdown,
//! measurement progress with the live BPM and signal trace, and the final
//! result or error. All acquisition logic lives below the read-only model
//! traits; this view only renders and publishes user input.

use eframe::egui;
use egui::{Color32, RichText};
use egui_plot::{Line, Plot};

use crate::{
    api::{
        model::{CameraModelApi, ModelHandle, SessionModelApi},
        view::ViewApi,
    },
    core::events::{AppEvent, UiInputEvent},
    model::session::MeasurementState,
};

fn render_device_selector<F: Fn(AppEvent) + ?Sized>(
    ui: &mut egui::Ui,
    publish: &F,
    camera: &dyn CameraModelApi,
    enabled: bool,
) {
    let devices = camera.get_devices();
    if devices.len() < 2 {
        return;
    }
    let current = camera.get_active_device();
    ui.add_enabled_ui(enabled, |ui| {
        egui::ComboBox::from_label("Camera")
            .selected_text(
                current
                    .as_ref()
                    .map_or(Default::default(), |d| d.get_name().to_owned()),
            )
            .show_ui(ui, |ui| {
                for device in devices {
                    if ui
                        .selectable_label(
                            current
                                .as_ref()
                                .map_or(false, |d| d.get_uuid() == device.get_uuid()),
                            device.get_name(),
                        )
                        .clicked()
                    {
                        publish(AppEvent::UiInput(UiInputEvent::SelectDevice(
                            device.clone(),
                        )));
                    }
                }
            });
    });
}

fn render_instructions(ui: &mut egui::Ui, model: &dyn SessionModelApi) {
    let instructions = model.get_instructions();
    ui.vertical_centered(|ui| {
        ui.label(RichText::new(instructions.icon).size(32.0));
        ui.label(RichText::new(instructions.title).strong());
        ui.label(RichText::new(instructions.detail).weak());
    });
}

fn render_signal_plot(ui: &mut egui::Ui, model: &dyn SessionModelApi) {
    let trace = model.get_signal_trace();
    if trace.is_empty() {
        return;
    }
    Plot::new("signal trace")
        .height(120.0)
        .show_axes([false, false])
        .show(ui, |plot_ui| {
            plot_ui.line(Line::new(trace).color(Color32::RED).name("signal"));
        });
}

fn render_measuring(ui: &mut egui::Ui, model: &dyn SessionModelApi) {
    ui.vertical_centered(|ui| {
        match model.get_live_bpm() {
            Some(bpm) => {
                ui.label(RichText::new(format!("{} BPM", bpm)).size(40.0).strong());
                ui.label("Measuring... Hold still.");
            }
            None => {
                ui.label("Detecting signal...");
            }
        }
        ui.add(egui::ProgressBar::new((model.get_progress() / 100.0) as f32).show_percentage());
    });
    render_signal_plot(ui, model);
}

fn render_result<F: Fn(AppEvent) + ?Sized>(
    ui: &mut egui::Ui,
    publish: &F,
    model: &dyn SessionModelApi,
) {
    ui.vertical_centered(|ui| {
        ui.label("Your Estimated Heart Rate");
        match model.get_final_bpm() {
            Some(bpm) => {
                ui.label(
                    RichText::new(format!("{}", bpm))
                        .size(64.0)
                        .strong()
                        .color(Color32::RED),
                );
                ui.label("BPM");
            }
            None => {
                ui.label(
                    RichText::new("Could not get a reliable reading. Please try again.")
                        .color(ui.visuals().error_fg_color),
                );
            }
        }
        if ui.button("Measure Again").clicked() {
            publish(AppEvent::UiInput(UiInputEvent::MeasureAgain));
        }
    });
}

fn render_error<F: Fn(AppEvent) + ?Sized>(
    ui: &mut egui::Ui,
    publish: &F,
    model: &dyn SessionModelApi,
) {
    ui.vertical_centered(|ui| {
        ui.label(
            RichText::new(model.get_error().unwrap_or("Camera unavailable."))
                .color(ui.visuals().error_fg_color),
        );
        if ui.button("Try Again").clicked() {
            publish(AppEvent::UiInput(UiInputEvent::Retry));
        }
    });
}

/// `VitalsView` structure.
///
/// Represents the view for the camera-based heart-rate measurement.
pub struct VitalsView {
    /// Shared access to the runtime session data.
    model: ModelHandle<dyn SessionModelApi>,
    camera_model: ModelHandle<dyn CameraModelApi>,
}

impl VitalsView {
    /// Creates a new `VitalsView` instance.
    ///
    /// # Arguments
    /// * `model` - Shared access to the runtime session data.
    /// * `camera_model` - Shared access to the camera model.
    pub fn new(
        model: ModelHandle<dyn SessionModelApi>,
        camera_model: ModelHandle<dyn CameraModelApi>,
    ) -> Self {
        Self {
            model,
            camera_model,
        }
    }
}

impl ViewApi for VitalsView {
    fn render<F: Fn(AppEvent) + ?Sized>(
        &mut self,
        publish: &F,
        ctx: &egui::Context,
    ) -> Result<(), String> {
        let model = self.model.blocking_read();
        let camera_model = self.camera_model.blocking_read();
        let state = model.get_state();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Measure Heart Rate");
            ui.label(RichText::new("Use your device's camera to check your pulse.").weak());
            ui.separator();

            if let Some(notice) = model.get_notice() {
                ui.label(RichText::new(notice).color(ui.visuals().warn_fg_color));
            }

            // Switching devices is only honored while idle; the selector
            // stays visible but disabled elsewhere.
            render_device_selector(
                ui,
                publish,
                &*camera_model,
                state == MeasurementState::Idle,
            );

            match state {
                MeasurementState::Idle => {
                    render_instructions(ui, &*model);
                    ui.vertical_centered(|ui| {
                        if ui.button("Start Measurement").clicked() {
                            publish(AppEvent::UiInput(UiInputEvent::StartMeasurement));
                        }
                    });
                }
                MeasurementState::Countdown => {
                    ui.vertical_centered(|ui| {
                        ui.label(
                            RichText::new(format!("{}", model.get_countdown()))
                                .size(64.0)
                                .strong(),
                        );
                    });
                }
                MeasurementState::Measuring => {
                    render_measuring(ui, &*model);
                }
                MeasurementState::Analyzing => {
                    ui.vertical_centered(|ui| {
                        ui.spinner();
                        ui.label("Analyzing...");
                    });
                }
                MeasurementState::Result => {
                    render_result(ui, publish, &*model);
                }
                MeasurementState::Error => {
                    render_error(ui, publish, &*model);
                }
            }

            ui.separator();
            ui.label(
                RichText::new(
                    "For informational use only. This feature is not a medical device; \
                     consult a healthcare professional for accurate medical data.",
                )
                .weak()
                .small(),
            );
        });

        Ok(())
    }
}
