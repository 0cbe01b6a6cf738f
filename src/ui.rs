use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::workflow::{AnalysisStage, Phase, WorkflowController};

const UI_PADDING: f32 = 20.0;

pub struct RipeCheckApp {
    pub workflow: Arc<Mutex<WorkflowController>>,
    pub config: Config,

    // Preview rendering
    pub preview_texture: Option<egui::TextureHandle>,
    pub last_preview_update: Option<Instant>,
    pub shown_preview_path: Option<PathBuf>,
}

impl RipeCheckApp {
    pub fn new(workflow: Arc<Mutex<WorkflowController>>, config: Config) -> Self {
        Self {
            workflow,
            config,
            preview_texture: None,
            last_preview_update: None,
            shown_preview_path: None,
        }
    }
}

impl eframe::App for RipeCheckApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ESC key to exit (for debugging in kiosk mode with keyboard)
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        let workflow = Arc::clone(&self.workflow);
        match workflow.try_lock() {
            Ok(mut wf) => {
                self.refresh_preview(ctx, &wf);
                self.render_app(ctx, &mut wf);

                if wf.phase() == Phase::CameraOpen {
                    // Keep repainting for a smooth live preview
                    ctx.request_repaint();
                }
            }
            Err(_) => {
                // A camera or analysis task holds the workflow right now
                self.render_working(ctx);
            }
        }

        // Poll for background task completions
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

// ============================================================================
// PREVIEW REFRESH
// ============================================================================

impl RipeCheckApp {
    fn refresh_preview(&mut self, ctx: &egui::Context, wf: &WorkflowController) {
        match wf.phase() {
            Phase::CameraOpen => {
                let now = Instant::now();
                let interval = Duration::from_millis(self.config.camera.preview_interval_ms);
                let due = match self.last_preview_update {
                    None => true,
                    Some(last) => now.duration_since(last) >= interval,
                };

                if due {
                    if let Some(path) = wf.session_preview_path() {
                        if let Ok(img) = image::open(path) {
                            self.update_preview_texture(ctx, &img.to_rgb8());
                            self.last_preview_update = Some(now);
                        }
                    }
                }
                self.shown_preview_path = None;
            }
            Phase::Preview | Phase::Analyzing | Phase::Result => {
                if let Some(path) = wf.artifact_preview_path() {
                    if self.shown_preview_path.as_deref() != Some(path) {
                        // Artifact changed, load its preview once
                        if let Ok(img) = image::open(path) {
                            self.update_preview_texture(ctx, &img.to_rgb8());
                        } else {
                            self.preview_texture = None;
                        }
                        self.shown_preview_path = Some(path.to_path_buf());
                    }
                }
            }
            Phase::Idle => {
                self.preview_texture = None;
                self.shown_preview_path = None;
                self.last_preview_update = None;
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl RipeCheckApp {
    fn render_app(&mut self, ctx: &egui::Context, wf: &mut WorkflowController) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                ui.heading("Banana Ripeness Checker");
            });

            if let Some(error) = wf.error() {
                ui.vertical_centered(|ui| {
                    ui.colored_label(egui::Color32::from_rgb(220, 80, 80), error);
                });
            }
            ui.add_space(8.0);
        });

        egui::TopBottomPanel::bottom("buttons").show(ctx, |ui| {
            ui.add_space(12.0);
            ui.horizontal(|ui| {
                ui.add_space(UI_PADDING);
                self.render_buttons(ui, wf);
            });
            ui.add_space(12.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            match wf.phase() {
                Phase::Idle => self.render_idle(ui),
                Phase::CameraOpen | Phase::Preview => self.render_image_viewport(ui),
                Phase::Analyzing => self.render_progress(ui, wf),
                Phase::Result => self.render_result(ui, wf),
            }
        });
    }

    fn render_working(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| {
                ui.spinner();
            });
        });
    }

    fn render_idle(&self, ui: &mut egui::Ui) {
        ui.centered_and_justified(|ui| {
            ui.label("Take or upload a photo of a banana to check its ripeness");
        });
    }

    fn render_image_viewport(&self, ui: &mut egui::Ui) {
        let rect = ui.available_rect_before_wrap();

        // Draw dark grey background
        ui.painter().rect_filled(
            rect,
            0.0,
            egui::Color32::from_rgb(40, 40, 40),
        );

        if let Some(texture) = &self.preview_texture {
            let image_size = texture.size_vec2();
            let display_size = fit_image_in_rect(image_size, rect.size());
            let centered_rect = center_rect_in_rect(display_size, rect);

            ui.allocate_ui_at_rect(centered_rect, |ui| {
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            });
        } else {
            ui.allocate_ui_at_rect(rect, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.label("No preview available");
                });
            });
        }
    }

    fn render_progress(&self, ui: &mut egui::Ui, wf: &WorkflowController) {
        let current = wf.stage().map(|s| s.index());

        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.spinner();
            ui.add_space(20.0);

            for stage in AnalysisStage::all() {
                let reached = current.map(|c| c >= stage.index()).unwrap_or(false);
                let text = if reached {
                    format!("✓ {}", stage.label())
                } else {
                    format!("· {}", stage.label())
                };

                if reached {
                    ui.label(egui::RichText::new(text).strong());
                } else {
                    ui.label(egui::RichText::new(text).weak());
                }
            }
        });
    }

    fn render_result(&self, ui: &mut egui::Ui, wf: &WorkflowController) {
        let Some(result) = wf.result() else {
            return;
        };

        ui.vertical_centered(|ui| {
            ui.add_space(30.0);

            if result.is_banana {
                if let Some(ripeness) = result.ripeness {
                    ui.label(egui::RichText::new(ripeness.name()).size(32.0).strong());
                }
                ui.add_space(8.0);
                ui.label(format!("Confidence: {}%", result.confidence_percent()));
            } else {
                ui.label(egui::RichText::new("That doesn't look like a banana").size(24.0));
                ui.add_space(8.0);
                ui.label(format!(
                    "Banana likelihood: {}%",
                    (result.banana_confidence * 100.0).round() as u32
                ));
            }

            if result.warnings.too_dark {
                ui.add_space(8.0);
                ui.colored_label(
                    egui::Color32::from_rgb(230, 180, 60),
                    "The photo looks too dark. Try more light.",
                );
            }
            if result.warnings.too_blurry {
                ui.add_space(4.0);
                ui.colored_label(
                    egui::Color32::from_rgb(230, 180, 60),
                    "The photo looks blurry. Try holding still.",
                );
            }
        });
    }

    fn render_buttons(&mut self, ui: &mut egui::Ui, wf: &mut WorkflowController) {
        match wf.phase() {
            Phase::Idle => {
                if ui.button("Open Camera").clicked() {
                    self.spawn_open_camera();
                }
                if ui.button("Upload Photo").clicked() {
                    self.pick_file(wf);
                }
            }
            Phase::CameraOpen => {
                if ui.button("Capture").clicked() {
                    self.spawn_capture();
                }
                if ui.button("Back").clicked() {
                    wf.close_camera();
                }
            }
            Phase::Preview => {
                let can_analyze = wf.has_artifact() && !wf.busy();
                if ui.add_enabled(can_analyze, egui::Button::new("Check Ripeness")).clicked() {
                    self.spawn_analysis();
                }
                if ui.button("Upload Photo").clicked() {
                    self.pick_file(wf);
                }
                if ui.button("Start Over").clicked() {
                    wf.reset();
                }
            }
            Phase::Analyzing => {
                if ui.button("Cancel").clicked() {
                    // Coarse cancellation: the in-flight response becomes
                    // stale and is discarded on arrival
                    wf.reset();
                }
            }
            Phase::Result => {
                if ui.button("Check Another").clicked() {
                    wf.reset();
                }
            }
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

impl RipeCheckApp {
    fn pick_file(&self, wf: &mut WorkflowController) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Image Files", &["png", "jpg", "jpeg", "bmp", "webp"])
            .pick_file()
        {
            wf.select_file(path);
        }
    }

    fn spawn_open_camera(&self) {
        let workflow = Arc::clone(&self.workflow);
        tokio::spawn(async move {
            workflow.lock().await.open_camera().await;
        });
    }

    fn spawn_capture(&self) {
        let workflow = Arc::clone(&self.workflow);
        tokio::spawn(async move {
            workflow.lock().await.capture_photo().await;
        });
    }

    fn spawn_analysis(&self) {
        let workflow = Arc::clone(&self.workflow);
        tokio::spawn(async move {
            let pending = {
                let mut wf = workflow.lock().await;
                let Some(pending) = wf.begin_analysis() else {
                    return;
                };
                wf.mark_submitted(pending.generation);
                pending
            };

            // The lock is not held during the request, so reset stays
            // available while the call is in flight
            let classifier = workflow.lock().await.classifier();
            let outcome = classifier.analyze(&pending.image).await;

            workflow.lock().await.finish_analysis(pending.generation, outcome);
        });
    }
}

// ============================================================================
// LAYOUT HELPERS
// ============================================================================

fn fit_image_in_rect(image_size: egui::Vec2, available: egui::Vec2) -> egui::Vec2 {
    let scale_x = available.x / image_size.x;
    let scale_y = available.y / image_size.y;
    let scale = scale_x.min(scale_y).min(1.0);
    image_size * scale
}

fn center_rect_in_rect(size: egui::Vec2, outer: egui::Rect) -> egui::Rect {
    let min = outer.min + (outer.size() - size) * 0.5;
    egui::Rect::from_min_size(min, size)
}
