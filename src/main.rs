use anyhow::Result;
use eframe::egui;
use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;

mod analysis_client;
mod camera_controller;
mod config;
mod image_source;
mod texture;
mod ui;
mod workflow;

use crate::analysis_client::AnalysisClient;
use crate::camera_controller::create_camera;
use crate::config::Config;
use crate::ui::RipeCheckApp;
use crate::workflow::WorkflowController;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("🍌 Starting Banana Ripeness Checker (Rust Edition)");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;
    config.create_directories()?;
    info!("Classification endpoint: {}", config.service.endpoint);

    // Initialize components
    let camera = create_camera(&config);
    let classifier = Arc::new(AnalysisClient::new(&config.service)?);
    let workflow = Arc::new(Mutex::new(WorkflowController::new(camera, classifier)));

    // Setup eframe options for the configured display
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.display.width as f32, config.display.height as f32])
            .with_fullscreen(config.display.fullscreen),
        ..Default::default()
    };

    info!("Launching GUI application...");

    // Run the application
    eframe::run_native(
        "Banana Ripeness Checker",
        options,
        Box::new(move |cc| {
            // Setup egui style for touch interface
            setup_touch_style(&cc.egui_ctx);

            Box::new(RipeCheckApp::new(workflow, config))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}

fn setup_touch_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    // Larger UI elements for touch interaction
    style.spacing.button_padding = egui::vec2(16.0, 12.0);
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(16.0);

    // Larger text for better readability
    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(16.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Heading,
        egui::FontId::new(24.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
