//! View Manager
//!
//! Bridges the controller and the egui event loop: receives view states
//! over a broadcast channel and renders the active view, publishing user
//! input back onto the event bus.

use std::sync::Arc;

use eframe::App;
use log::error;
use tokio::{
    sync::broadcast::{Receiver, Sender},
    sync::RwLock,
    task::JoinHandle,
};

use crate::{
    api::{
        model::{CameraModelApi, ModelHandle, SessionModelApi},
        view::ViewApi,
    },
    core::events::AppEvent,
};

use super::vitals::VitalsView;

/// The views the controller can put on screen.
#[derive(Clone)]
pub enum ViewState {
    Vitals((ModelHandle<dyn SessionModelApi>, ModelHandle<dyn CameraModelApi>)),
}

enum View {
    NoView,
    Vitals(VitalsView),
}

impl ViewApi for View {
    fn render<F: Fn(AppEvent) + ?Sized>(
        &mut self,
        publish: &F,
        ctx: &egui::Context,
    ) -> Result<(), String> {
        match self {
            Self::Vitals(v) => v.render(publish, ctx),
            Self::NoView => Ok(()),
        }
    }
}

impl From<ViewState> for View {
    fn from(val: ViewState) -> Self {
        match val {
            ViewState::Vitals((session, camera)) => View::Vitals(VitalsView::new(session, camera)),
        }
    }
}

pub struct ViewManager {
    e_tx: Sender<AppEvent>,
    active_view: Arc<RwLock<View>>,
    _task_handle: JoinHandle<()>,
}

impl ViewManager {
    pub fn new(mut v_rx: Receiver<ViewState>, e_tx: Sender<AppEvent>) -> Self {
        let active_view = Arc::new(RwLock::new(View::NoView));
        let task_view = active_view.clone();
        let _task_handle = tokio::spawn(async move {
            while let Ok(s) = v_rx.recv().await {
                *task_view.write().await = s.into();
            }
        });

        Self {
            e_tx,
            active_view,
            _task_handle,
        }
    }

    fn publish(&self, event: AppEvent) {
        if let Err(e) = self.e_tx.send(event) {
            error!("View failed to send event: {}", e)
        }
    }
}

impl App for ViewManager {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_pixels_per_point(1.5);
        if let Err(e) = self
            .active_view
            .blocking_write()
            .render(&|e| self.publish(e), ctx)
        {
            error!("view failed to render: {}", e)
        }
    }
}
