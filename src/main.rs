//! rPPG Heart-Rate Monitor
//!
//! Estimates the user's pulse from a camera via remote
//! photoplethysmography. The binary wires the camera component, the
//! measurement session and the acquisition controller together and starts
//! the eframe UI.

use eframe::NativeOptions;
use env_logger::Env;
use rppg_rs::components::application::AppController;
use rppg_rs::components::camera::CameraComponent;
#[cfg(not(feature = "mock"))]
use rppg_rs::components::camera::NokhwaGrabber;
#[cfg(feature = "mock")]
use rppg_rs::components::camera::SyntheticGrabber;
use rppg_rs::components::session::SessionData;
use tokio::runtime::Runtime;

/// Main entry point of the application.
///
/// Initializes logging, sets up the asynchronous runtime, and starts the
/// application with the eframe framework.
fn main() {
    // Initialize logger with environment-specific settings.
    env_logger::Builder::from_env(
        Env::default()
            .filter_or("MY_LOG_LEVEL", "info")
            .write_style_or("MY_LOG_STYLE", "always"),
    )
    .init();

    // Create a new Tokio runtime for asynchronous operations.
    let rt = Runtime::new().expect("Unable to create Runtime");
    let _enter = rt.enter();

    // Event bus connecting the view, the controller and the frame pump.
    let (event_bus, _) = tokio::sync::broadcast::channel(256);

    #[cfg(feature = "mock")]
    let camera = CameraComponent::<SyntheticGrabber>::new(event_bus.clone());
    #[cfg(not(feature = "mock"))]
    let camera = CameraComponent::<NokhwaGrabber>::new(event_bus.clone());

    let controller = AppController::new(camera, SessionData::default(), event_bus);

    // Start the eframe application with the main view manager.
    eframe::run_native(
        "rPPG-rs",
        NativeOptions::default(),
        Box::new(|cc| {
            let view_manager = controller.get_viewmanager();
            tokio::spawn(controller.event_handler(cc.egui_ctx.clone()));
            Ok(Box::new(view_manager))
        }),
    )
    .expect("Failed to start eframe application");
}
