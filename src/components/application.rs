//! Application Controller
//!
//! This module defines the main controller responsible for orchestrating a
//! measurement. It owns the acquisition state machine, all timer tasks
//! (countdown, progress, analysis delay) and the fallback behavior on
//! camera failures, and dispatches application-level events to the camera
//! and session components.

use crate::{
    api::{
        controller::{CameraApi, SessionApi},
        model::{CameraModelApi, ModelHandle, SessionModelApi},
    },
    core::{
        constants::{ANALYSIS_DELAY_MS, COUNTDOWN_SECONDS, MEASUREMENT_DURATION_MS, PROGRESS_TICK_MS},
        events::{AppEvent, CameraEvent, TimerEvent, UiInputEvent},
    },
    model::{
        camera::CameraError,
        session::{MeasurementMethod, MeasurementState},
    },
    view::manager::{ViewManager, ViewState},
};

use anyhow::Result;
use log::{error, trace, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast::Sender, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Main application controller.
///
/// This structure manages the lifecycle of the camera and session
/// components and handles application-level events. Every periodic activity
/// it starts is tracked by a `JoinHandle` and aborted on the transition away
/// from its owning state and on teardown.
pub struct AppController<ST: SessionApi + 'static, CT: CameraApi + 'static> {
    view_tx: Sender<ViewState>,
    event_bus: Sender<AppEvent>,
    camera: Arc<RwLock<CT>>,
    session: Arc<RwLock<ST>>,
    countdown_handle: Option<JoinHandle<()>>,
    progress_handle: Option<JoinHandle<()>>,
    analysis_handle: Option<JoinHandle<()>>,
    light_enabled: bool,
}

impl<ST: SessionApi + 'static, CT: CameraApi + 'static> Drop for AppController<ST, CT> {
    /// Stops all timer tasks when the controller goes away. The camera
    /// component aborts its own pump on drop.
    fn drop(&mut self) {
        for handle in [
            &self.countdown_handle,
            &self.progress_handle,
            &self.analysis_handle,
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

impl<ST: SessionApi + 'static, CT: CameraApi + 'static> AppController<ST, CT> {
    /// Creates a new `AppController`.
    ///
    /// # Arguments
    /// - `camera`: The camera component.
    /// - `session`: The measurement session.
    /// - `event_bus`: The event bus for broadcasting application events.
    pub fn new(camera: CT, session: ST, event_bus: Sender<AppEvent>) -> Self {
        trace!("Initializing AppController.");
        let (vtx, _) = tokio::sync::broadcast::channel(16);
        Self {
            view_tx: vtx,
            event_bus,
            camera: Arc::new(RwLock::new(camera)),
            session: Arc::new(RwLock::new(session)),
            countdown_handle: None,
            progress_handle: None,
            analysis_handle: None,
            light_enabled: false,
        }
    }

    /// Returns the view manager subscribed to this controller.
    pub fn get_viewmanager(&self) -> ViewManager {
        ViewManager::new(self.view_tx.subscribe(), self.event_bus.clone())
    }

    /// Derives the acquisition method from the active device capabilities.
    async fn apply_capabilities(&mut self) -> Result<()> {
        let has_light = self
            .camera
            .read()
            .await
            .get_capabilities()
            .map(|c| c.has_light)
            .unwrap_or(false);
        let method = if has_light {
            MeasurementMethod::Finger
        } else {
            MeasurementMethod::Face
        };
        self.session.write().await.set_method(method).await
    }

    /// (Re-)initializes the camera from scratch; on success the session is
    /// back in the idle state with a method matching the capabilities, on
    /// failure it sits in the persistent error state.
    async fn initialize_camera(&mut self) -> Result<()> {
        let outcome = self.camera.write().await.initialize().await;
        match outcome {
            Ok(()) => {
                {
                    let mut session = self.session.write().await;
                    if session.get_state() == MeasurementState::Error {
                        session.transition(MeasurementState::Idle).await?;
                    }
                    session.reset().await?;
                }
                self.apply_capabilities().await
            }
            Err(e) => {
                warn!("camera initialization failed: {}", e);
                self.session.write().await.fail(fatal_message(&e)).await
            }
        }
    }

    /// Handles a user request to start a measurement from the idle state.
    async fn start_measurement(&mut self) -> Result<()> {
        {
            let session = self.session.read().await;
            if session.get_state() != MeasurementState::Idle {
                warn!("start requested outside idle state, ignored");
                return Ok(());
            }
        }
        self.session.write().await.reset().await?;

        let method = self.session.read().await.get_method();
        if method == MeasurementMethod::Finger {
            // Light failure is recovered locally: drop to face mode, tell
            // the user, keep going.
            let lit = self.camera.write().await.set_light(true).await;
            match lit {
                Ok(()) => self.light_enabled = true,
                Err(e) => {
                    warn!("could not switch the light on: {}", e);
                    let mut session = self.session.write().await;
                    session.set_method(MeasurementMethod::Face).await?;
                    session
                        .set_notice(Some(
                            "Could not switch on the light. Switching to face mode.".to_string(),
                        ))
                        .await?;
                }
            }
        }

        {
            let mut session = self.session.write().await;
            session.transition(MeasurementState::Countdown).await?;
            session.set_countdown(COUNTDOWN_SECONDS).await?;
        }

        let bus = self.event_bus.clone();
        self.countdown_handle = Some(tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if bus.send(AppEvent::Timer(TimerEvent::CountdownTick)).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Countdown reached zero: enter the measurement window, start the
    /// frame pump and the progress timer enforcing the hard deadline.
    async fn begin_measuring(&mut self) -> Result<()> {
        if let Some(handle) = self.countdown_handle.take() {
            handle.abort();
        }
        {
            let mut session = self.session.write().await;
            session.transition(MeasurementState::Measuring).await?;
            session.set_progress(0.0).await?;
        }
        let streaming = self.camera.write().await.start_streaming().await;
        if let Err(e) = streaming {
            self.abort_acquisition().await;
            return self
                .session
                .write()
                .await
                .fail(format!("Could not start the camera stream: {}", e))
                .await;
        }

        let bus = self.event_bus.clone();
        self.progress_handle = Some(tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_millis(PROGRESS_TICK_MS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let elapsed = started.elapsed().as_millis() as u64;
                let percent = (elapsed as f64 / MEASUREMENT_DURATION_MS as f64) * 100.0;
                if bus
                    .send(AppEvent::Timer(TimerEvent::ProgressTick(percent.min(100.0))))
                    .is_err()
                {
                    break;
                }
                if elapsed >= MEASUREMENT_DURATION_MS {
                    let _ = bus.send(AppEvent::Timer(TimerEvent::MeasurementElapsed));
                    break;
                }
            }
        }));
        Ok(())
    }

    /// The measurement window elapsed: stop the pump, restore the light and
    /// settle before finalizing.
    async fn finish_measurement(&mut self) -> Result<()> {
        if let Some(handle) = self.progress_handle.take() {
            handle.abort();
        }
        self.camera.write().await.stop_streaming().await?;
        if self.light_enabled {
            if let Err(e) = self.camera.write().await.set_light(false).await {
                warn!("could not switch the light off: {}", e);
            }
            self.light_enabled = false;
        }
        self.session
            .write()
            .await
            .transition(MeasurementState::Analyzing)
            .await?;

        let bus = self.event_bus.clone();
        self.analysis_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ANALYSIS_DELAY_MS)).await;
            let _ = bus.send(AppEvent::Timer(TimerEvent::AnalysisComplete));
        }));
        Ok(())
    }

    /// Stops every periodic activity and restores the light; used on faults
    /// and full re-initialization.
    async fn abort_acquisition(&mut self) {
        for handle in [
            self.countdown_handle.take(),
            self.progress_handle.take(),
            self.analysis_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        let mut camera = self.camera.write().await;
        if let Err(e) = camera.stop_streaming().await {
            warn!("could not stop streaming during teardown: {}", e);
        }
        if self.light_enabled {
            let _ = camera.set_light(false).await;
            self.light_enabled = false;
        }
    }

    async fn handle_ui(&mut self, event: UiInputEvent) -> Result<()> {
        match event {
            UiInputEvent::StartMeasurement => self.start_measurement().await,
            UiInputEvent::MeasureAgain => {
                let mut session = self.session.write().await;
                if session.get_state() != MeasurementState::Result {
                    warn!("measure again requested outside result state, ignored");
                    return Ok(());
                }
                session.transition(MeasurementState::Idle).await?;
                session.reset().await
            }
            UiInputEvent::SelectDevice(device) => {
                if self.session.read().await.get_state() != MeasurementState::Idle {
                    // Switching is only permitted while idle; reject as a
                    // no-op, not an error.
                    warn!("device switch requested outside idle state, ignored");
                    return Ok(());
                }
                let switched = self.camera.write().await.select_device(device).await;
                match switched {
                    Ok(()) => self.apply_capabilities().await,
                    Err(e) if e.is_fatal() => {
                        self.session.write().await.fail(fatal_message(&e)).await
                    }
                    Err(e) => {
                        warn!("device switch failed: {}", e);
                        Ok(())
                    }
                }
            }
            UiInputEvent::Retry => {
                if self.session.read().await.get_state() != MeasurementState::Error {
                    warn!("retry requested outside error state, ignored");
                    return Ok(());
                }
                self.abort_acquisition().await;
                self.camera.write().await.shutdown().await?;
                self.initialize_camera().await
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) -> Result<()> {
        match event {
            TimerEvent::CountdownTick => {
                if self.session.read().await.get_state() != MeasurementState::Countdown {
                    return Ok(());
                }
                let remaining = self.session.read().await.get_countdown();
                if remaining <= 1 {
                    self.session.write().await.set_countdown(0).await?;
                    self.begin_measuring().await
                } else {
                    self.session.write().await.set_countdown(remaining - 1).await
                }
            }
            TimerEvent::ProgressTick(percent) => {
                let mut session = self.session.write().await;
                if session.get_state() != MeasurementState::Measuring {
                    return Ok(());
                }
                session.set_progress(percent).await
            }
            TimerEvent::MeasurementElapsed => {
                if self.session.read().await.get_state() != MeasurementState::Measuring {
                    return Ok(());
                }
                self.finish_measurement().await
            }
            TimerEvent::AnalysisComplete => {
                if let Some(handle) = self.analysis_handle.take() {
                    handle.abort();
                }
                let mut session = self.session.write().await;
                if session.get_state() != MeasurementState::Analyzing {
                    return Ok(());
                }
                session.finalize().await?;
                session.transition(MeasurementState::Result).await
            }
        }
    }

    async fn handle_camera(&mut self, event: CameraEvent) -> Result<()> {
        match event {
            CameraEvent::Fault(message) => {
                warn!("camera fault: {}", message);
                self.abort_acquisition().await;
                self.session
                    .write()
                    .await
                    .fail(format!("Camera failure: {}", message))
                    .await
            }
        }
    }

    /// Dispatches application-level events to the appropriate components.
    async fn dispatch_event(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Session(event) => {
                let mut lck = self.session.write().await;
                event.forward_to(&mut *lck).await
            }
            AppEvent::UiInput(event) => self.handle_ui(event).await,
            AppEvent::Timer(event) => self.handle_timer(event).await,
            AppEvent::Camera(event) => self.handle_camera(event).await,
        }
    }

    /// Asynchronous event handler.
    ///
    /// Initializes the camera, publishes the view state and processes
    /// application-level events until the bus closes.
    ///
    /// # Arguments
    /// - `gui_ctx`: The GUI context, repainted after each handled event.
    pub async fn event_handler(mut self, gui_ctx: egui::Context) {
        if let Err(e) = self.initialize_camera().await {
            error!("camera setup failed: {}", e);
        }

        let session_handle: ModelHandle<dyn SessionModelApi> = self.session.clone();
        let camera_handle: ModelHandle<dyn CameraModelApi> = self.camera.clone();
        while let Err(e) = self.view_tx.send(ViewState::Vitals((
            session_handle.clone(),
            camera_handle.clone(),
        ))) {
            error!(
                "could not send initial viewstate, trying again in 5 sec: {}",
                e
            );
            tokio::time::sleep(Duration::from_secs(5)).await;
        }

        let mut event_ch_rx = self.event_bus.subscribe();
        loop {
            match event_ch_rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.dispatch_event(event).await {
                        error!("error during event handling: {}", e);
                    }
                    gui_ctx.request_repaint();
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event handler lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// User-facing message for a session-fatal camera error.
fn fatal_message(error: &CameraError) -> String {
    match error {
        CameraError::PermissionDenied => {
            "Camera access denied. Enable camera permissions and try again.".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::session::SessionData;
    use crate::model::camera::{CameraCapabilities, DeviceDescriptor};
    use crate::model::signal::Sample;
    use anyhow::Result;
    use async_trait::async_trait;
    use mockall::mock;
    use std::fmt::Debug;
    use tokio::sync::broadcast;

    mock! {
        Camera{}
        impl Debug for Camera{
            fn fmt<'a>(&self, f: &mut std::fmt::Formatter<'a>) -> std::fmt::Result;
        }
        impl CameraModelApi for Camera{
            fn get_devices(&self) -> &[DeviceDescriptor];
            fn get_active_device(&self) -> Option<DeviceDescriptor>;
            fn get_capabilities(&self) -> Option<CameraCapabilities>;
            fn is_streaming(&self) -> bool;
        }
        #[async_trait]
        impl CameraApi for Camera{
            async fn initialize(&mut self) -> Result<(), CameraError>;
            async fn select_device(&mut self, device: DeviceDescriptor) -> Result<(), CameraError>;
            async fn set_light(&mut self, on: bool) -> Result<(), CameraError>;
            async fn start_streaming(&mut self) -> Result<()>;
            async fn stop_streaming(&mut self) -> Result<()>;
            async fn shutdown(&mut self) -> Result<()>;
        }
    }

    fn controller_with(
        camera: MockCamera,
    ) -> (
        AppController<SessionData, MockCamera>,
        broadcast::Receiver<AppEvent>,
    ) {
        let (event_bus_tx, rx) = broadcast::channel(64);
        (
            AppController::new(camera, SessionData::default(), event_bus_tx),
            rx,
        )
    }

    async fn session_state(controller: &AppController<SessionData, MockCamera>) -> MeasurementState {
        controller.session.read().await.get_state()
    }

    #[tokio::test]
    async fn test_start_from_idle_enters_countdown() {
        let (mut controller, _rx) = controller_with(MockCamera::new());
        controller
            .handle_ui(UiInputEvent::StartMeasurement)
            .await
            .unwrap();
        assert_eq!(session_state(&controller).await, MeasurementState::Countdown);
        assert_eq!(
            controller.session.read().await.get_countdown(),
            COUNTDOWN_SECONDS
        );
        assert!(controller.countdown_handle.is_some());
    }

    #[tokio::test]
    async fn test_start_outside_idle_is_ignored() {
        let (mut controller, _rx) = controller_with(MockCamera::new());
        controller
            .handle_ui(UiInputEvent::StartMeasurement)
            .await
            .unwrap();
        // Second start while counting down must not touch the state.
        controller
            .handle_ui(UiInputEvent::StartMeasurement)
            .await
            .unwrap();
        assert_eq!(session_state(&controller).await, MeasurementState::Countdown);
    }

    #[tokio::test]
    async fn test_light_failure_falls_back_to_face_mode() {
        let mut camera = MockCamera::new();
        camera
            .expect_set_light()
            .once()
            .returning(|_| Err(CameraError::LightControlFailed("no torch".to_string())));
        let (mut controller, _rx) = controller_with(camera);
        controller
            .session
            .write()
            .await
            .set_method(MeasurementMethod::Finger)
            .await
            .unwrap();

        controller
            .handle_ui(UiInputEvent::StartMeasurement)
            .await
            .unwrap();

        let session = controller.session.read().await;
        assert_eq!(session.get_state(), MeasurementState::Countdown);
        assert_eq!(session.get_method(), MeasurementMethod::Face);
        assert!(session.get_notice().is_some());
    }

    #[tokio::test]
    async fn test_countdown_reaches_measuring() {
        let mut camera = MockCamera::new();
        camera.expect_start_streaming().once().returning(|| Ok(()));
        let (mut controller, _rx) = controller_with(camera);
        controller
            .handle_ui(UiInputEvent::StartMeasurement)
            .await
            .unwrap();

        for _ in 0..COUNTDOWN_SECONDS {
            controller
                .handle_timer(TimerEvent::CountdownTick)
                .await
                .unwrap();
        }
        assert_eq!(session_state(&controller).await, MeasurementState::Measuring);
        assert_eq!(controller.session.read().await.get_countdown(), 0);
        assert!(controller.countdown_handle.is_none());
        assert!(controller.progress_handle.is_some());
    }

    #[tokio::test]
    async fn test_device_switch_rejected_while_measuring() {
        let camera = MockCamera::new();
        let (mut controller, _rx) = controller_with(camera);
        {
            let mut session = controller.session.write().await;
            session.transition(MeasurementState::Countdown).await.unwrap();
            session.transition(MeasurementState::Measuring).await.unwrap();
        }
        // select_device has no expectation: a call would panic.
        controller
            .handle_ui(UiInputEvent::SelectDevice(DeviceDescriptor::new(
                "Other".to_string(),
                1,
            )))
            .await
            .unwrap();
        assert_eq!(session_state(&controller).await, MeasurementState::Measuring);
    }

    #[tokio::test]
    async fn test_device_switch_honored_while_idle() {
        let mut camera = MockCamera::new();
        camera.expect_select_device().once().returning(|_| Ok(()));
        camera.expect_get_capabilities().returning(|| {
            Some(CameraCapabilities {
                has_light: true,
                width: 640,
                height: 480,
                frame_rate: 30,
            })
        });
        let (mut controller, _rx) = controller_with(camera);
        controller
            .handle_ui(UiInputEvent::SelectDevice(DeviceDescriptor::new(
                "Other".to_string(),
                1,
            )))
            .await
            .unwrap();
        // Capabilities of the new device drive the method.
        assert_eq!(
            controller.session.read().await.get_method(),
            MeasurementMethod::Finger
        );
    }

    #[tokio::test]
    async fn test_elapsed_measurement_settles_then_finalizes() {
        let mut camera = MockCamera::new();
        camera.expect_stop_streaming().once().returning(|| Ok(()));
        camera
            .expect_set_light()
            .with(mockall::predicate::eq(false))
            .once()
            .returning(|_| Ok(()));
        let (mut controller, _rx) = controller_with(camera);
        {
            let mut session = controller.session.write().await;
            session.transition(MeasurementState::Countdown).await.unwrap();
            session.transition(MeasurementState::Measuring).await.unwrap();
        }
        controller.light_enabled = true;

        controller
            .handle_timer(TimerEvent::MeasurementElapsed)
            .await
            .unwrap();
        assert_eq!(session_state(&controller).await, MeasurementState::Analyzing);
        assert!(!controller.light_enabled);
        assert!(controller.analysis_handle.is_some());

        controller
            .handle_timer(TimerEvent::AnalysisComplete)
            .await
            .unwrap();
        let session = controller.session.read().await;
        assert_eq!(session.get_state(), MeasurementState::Result);
        // No samples were recorded: the unreliable-reading outcome.
        assert_eq!(session.get_final_bpm(), None);
    }

    #[tokio::test]
    async fn test_fault_enters_persistent_error_state() {
        let mut camera = MockCamera::new();
        camera.expect_stop_streaming().returning(|| Ok(()));
        let (mut controller, _rx) = controller_with(camera);
        {
            let mut session = controller.session.write().await;
            session.transition(MeasurementState::Countdown).await.unwrap();
        }
        controller
            .handle_camera(CameraEvent::Fault("device unplugged".to_string()))
            .await
            .unwrap();
        let session = controller.session.read().await;
        assert_eq!(session.get_state(), MeasurementState::Error);
        assert!(session.get_error().unwrap().contains("device unplugged"));
    }

    #[tokio::test]
    async fn test_measure_again_returns_to_idle() {
        let (mut controller, _rx) = controller_with(MockCamera::new());
        {
            let mut session = controller.session.write().await;
            session.transition(MeasurementState::Countdown).await.unwrap();
            session.transition(MeasurementState::Measuring).await.unwrap();
            session.transition(MeasurementState::Analyzing).await.unwrap();
            session.transition(MeasurementState::Result).await.unwrap();
        }
        controller
            .handle_ui(UiInputEvent::MeasureAgain)
            .await
            .unwrap();
        assert_eq!(session_state(&controller).await, MeasurementState::Idle);
    }

    #[tokio::test]
    async fn test_retry_reinitializes_after_error() {
        let mut camera = MockCamera::new();
        camera.expect_stop_streaming().returning(|| Ok(()));
        camera.expect_shutdown().once().returning(|| Ok(()));
        camera.expect_initialize().once().returning(|| Ok(()));
        camera.expect_get_capabilities().returning(|| None);
        let (mut controller, _rx) = controller_with(camera);
        controller
            .session
            .write()
            .await
            .fail("gone".to_string())
            .await
            .unwrap();

        controller.handle_ui(UiInputEvent::Retry).await.unwrap();
        let session = controller.session.read().await;
        assert_eq!(session.get_state(), MeasurementState::Idle);
        assert_eq!(session.get_error(), None);
        assert_eq!(session.get_method(), MeasurementMethod::Face);
    }

    #[tokio::test]
    async fn test_samples_flow_into_session_while_measuring() {
        let (mut controller, _rx) = controller_with(MockCamera::new());
        {
            let mut session = controller.session.write().await;
            session.transition(MeasurementState::Countdown).await.unwrap();
            session.transition(MeasurementState::Measuring).await.unwrap();
        }
        let sample = Sample::new(time::Duration::milliseconds(33), 128.0);
        controller
            .dispatch_event(AppEvent::Session(crate::core::events::SessionEvent::RecordSample(sample)))
            .await
            .unwrap();
        assert_eq!(controller.session.read().await.get_signal_trace().len(), 1);
    }
}
