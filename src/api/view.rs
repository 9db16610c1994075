//! Core View Trait
//!
//! This module defines the `ViewApi` trait, which is implemented by all
//! views of the monitor. It provides a standardized interface for rendering
//! and publishing user input back to the controller.

use crate::core::events::AppEvent;

/// Trait defining the interface for application views.
///
/// This trait ensures that all views implement methods for rendering and
/// updates.
pub trait ViewApi: Send {
    /// Renders the view and publishes events based on user interactions.
    ///
    /// # Arguments
    /// * `publish` - A function to publish `AppEvent`s.
    /// * `ctx` - The `egui::Context` for rendering the UI.
    ///
    /// # Returns
    /// A result indicating success or failure.
    fn render<F: Fn(AppEvent) + ?Sized>(
        &mut self,
        publish: &F,
        ctx: &egui::Context,
    ) -> Result<(), String>;
}
