//! Engine state and the cooperative tick
//!
//! `App` owns every subsystem and is driven by one `tick(now)` call per host
//! frame. Per tick: tracking fusion runs first and may move the origin, then
//! pointer-follow, then the render cadence composites, post-processes and
//! sends a frame, and the draw cadence feeds the preview its own copy.
//!
//! Time is seconds since the engine started, supplied by the caller.

use std::path::Path;
use std::sync::Arc;

use crate::compositor::{LayerEngine, TimeBase};
use crate::effects::{EffectRegistry, ParamSet};
use crate::geometry::BoardLayout;
use crate::layout::{LayoutDocument, LayoutError};
use crate::origin::OriginState;
use crate::output::{ColorProcessor, FrameLink, LinkError, PreviewSink, SendOutcome, TrackingOverlay};
use crate::settings::{EngineSettings, MAX_RENDER_FPS, MIN_RENDER_FPS};
use crate::telemetry::{FrameProfiler, LinkStats};
use crate::tracking::{FusionEvent, TrackingFusion, TrackingSettings, RIPPLE_EFFECT_ID, RIPPLE_PARAMS};

/// Preview redraw rate
pub const DRAW_FPS: f64 = 30.0;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// A frame was composited for the link
    pub rendered: bool,
    pub sent: Option<SendOutcome>,
    /// The preview was redrawn
    pub drawn: bool,
    pub ripples: usize,
}

pub struct App {
    settings: EngineSettings,
    layout: BoardLayout,
    origin: OriginState,
    engine: LayerEngine,
    fusion: TrackingFusion,
    color: ColorProcessor,
    link: Option<FrameLink>,
    link_ready_at: f64,
    preview: Option<Box<dyn PreviewSink>>,
    raw_frame: Vec<u8>,
    send_frame: Vec<u8>,
    preview_frame: Vec<u8>,
    running: bool,
    last_render: Option<f64>,
    last_draw: Option<f64>,
    profiler: FrameProfiler,
    status: String,
    status_sub: String,
}

impl App {
    pub fn new(mut settings: EngineSettings, registry: Arc<EffectRegistry>) -> Self {
        settings.clamp_ranges();
        if registry.is_empty() {
            tracing::warn!("no effects registered, frames will be black");
        }

        let layout = BoardLayout::default();
        let mut origin = OriginState::new();
        origin.snap = settings.snap();

        let mut engine = LayerEngine::new(registry);
        if let Some(id) = settings.active_effect.as_deref() {
            engine.set_active(id);
        }

        let fusion = TrackingFusion::new(settings.tracking.clone());
        let color = ColorProcessor::new(settings.color.gamma);
        let frame_len = layout.world().frame_len();

        tracing::info!(
            boards = layout.board_count(),
            effect = engine.active_id().unwrap_or("-"),
            fps = settings.render_fps,
            "engine ready"
        );

        Self {
            settings,
            layout,
            origin,
            engine,
            fusion,
            color,
            link: None,
            link_ready_at: 0.0,
            preview: None,
            raw_frame: vec![0; frame_len],
            send_frame: vec![0; frame_len],
            preview_frame: vec![0; frame_len],
            running: false,
            last_render: None,
            last_draw: None,
            profiler: FrameProfiler::new(),
            status: "idle".to_string(),
            status_sub: "fps: --  seq: ----".to_string(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut BoardLayout {
        &mut self.layout
    }

    pub fn origin(&self) -> &OriginState {
        &self.origin
    }

    pub fn engine(&self) -> &LayerEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut LayerEngine {
        &mut self.engine
    }

    pub fn fusion(&self) -> &TrackingFusion {
        &self.fusion
    }

    pub fn fusion_mut(&mut self) -> &mut TrackingFusion {
        &mut self.fusion
    }

    pub fn profiler(&self) -> &FrameProfiler {
        &self.profiler
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Connection state: `idle`, `connected`, `running`, `send error` or `connect failed`
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Secondary status, e.g. `fps: 30  seq: 0012`
    pub fn status_sub(&self) -> &str {
        &self.status_sub
    }

    pub fn link_stats(&self) -> Option<LinkStats> {
        self.link.as_ref().map(FrameLink::stats)
    }

    /// The last post-processed frame handed to the link
    pub fn last_sent_frame(&self) -> &[u8] {
        &self.send_frame
    }

    pub fn set_preview(&mut self, preview: Box<dyn PreviewSink>) {
        self.preview = Some(preview);
    }

    pub fn set_render_fps(&mut self, fps: u32) {
        self.settings.render_fps = fps.clamp(MIN_RENDER_FPS, MAX_RENDER_FPS);
        self.refresh_status_sub();
    }

    pub fn set_color(&mut self, color: crate::output::ColorSettings) {
        self.settings.color = color;
        self.settings.color.clamp_ranges();
    }

    /// Replace tracking settings; reopens the feed if its url or mode changed
    pub fn set_tracking(&mut self, tracking: TrackingSettings) {
        self.fusion.set_settings(tracking);
        self.settings.tracking = self.fusion.settings().clone();
    }

    pub fn set_active_effect(&mut self, id: &str) {
        self.engine.set_active(id);
        self.settings.active_effect = self.engine.active_id().map(str::to_string);
    }

    // --- origin writers ---

    pub fn set_origin(&mut self, x: f64, y: f64) {
        self.origin.set_manual(x, y);
        self.engine.on_origin_changed();
    }

    /// Place the origin from a pointer position, honoring snap unless bypassed
    pub fn set_origin_at_pointer(&mut self, x: f64, y: f64, bypass_snap: bool) {
        self.origin.set_at_world(x, y, bypass_snap);
        self.engine.on_origin_changed();
    }

    pub fn origin_to_board(&mut self, index: usize) {
        if let Some(board) = self.layout.boards().get(index).copied() {
            self.origin.to_board(&board);
            self.engine.on_origin_changed();
        }
    }

    pub fn set_pointer(&mut self, x: f64, y: f64) {
        self.origin.set_pointer(x, y);
    }

    pub fn set_follow(&mut self, on: bool, now: f64) {
        if self.origin.set_follow(on) {
            self.engine.on_origin_changed();
            let (x, y) = self.origin.position();
            self.engine.spawn_layer_from_current(now, x, y);
        }
    }

    // --- layout ---

    pub fn capture_layout(&self) -> LayoutDocument {
        LayoutDocument::capture(&self.layout, &self.origin, &self.engine)
    }

    pub fn apply_layout(&mut self, doc: &LayoutDocument) -> Result<(), LayoutError> {
        doc.apply(&mut self.layout, &mut self.origin, &mut self.engine)?;
        self.settings.active_effect = self.engine.active_id().map(str::to_string);
        Ok(())
    }

    pub fn reset_boards(&mut self) {
        self.layout.reset_all();
    }

    // --- link lifecycle ---

    /// Attach an opened link; sending may start after the post-open delay
    pub fn attach_link(&mut self, link: FrameLink, now: f64) {
        self.link = Some(link);
        self.link_ready_at = now + self.settings.link.post_open_delay_ms as f64 / 1000.0;
        self.status = "connected".to_string();
        self.refresh_status_sub();
    }

    /// Open a device node or file as the frame link
    pub fn connect_port(&mut self, path: &Path, now: f64) -> Result<(), LinkError> {
        match FrameLink::open_path(path) {
            Ok(link) => {
                self.attach_link(link, now);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "link connect failed");
                self.link = None;
                self.status = "connect failed".to_string();
                Err(e)
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.stop();
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.status = "idle".to_string();
        self.refresh_status_sub();
    }

    /// Start sending; false without a link or before it is ready
    pub fn start(&mut self, now: f64) -> bool {
        if self.link.is_none() || now < self.link_ready_at {
            return false;
        }
        self.running = true;
        self.last_render = None;
        self.status = "running".to_string();
        self.refresh_status_sub();
        tracing::info!(fps = self.settings.render_fps, "output started");
        true
    }

    pub fn stop(&mut self) {
        if self.running {
            tracing::info!("output stopped");
        }
        self.running = false;
        self.status = if self.link.is_some() { "connected" } else { "idle" }.to_string();
        self.refresh_status_sub();
    }

    fn refresh_status_sub(&mut self) {
        self.status_sub = match self.link.as_ref() {
            Some(link) => format!("fps: {}  seq: {:04}", self.settings.render_fps, link.seq()),
            None => "fps: --  seq: ----".to_string(),
        };
    }

    // --- tick ---

    pub fn tick(&mut self, now: f64) -> TickReport {
        self.profiler.begin_frame();
        let mut report = TickReport::default();

        self.check_link();

        let update = self.fusion.update(now, &self.layout);
        for event in &update.events {
            if matches!(event, FusionEvent::SpawnRipple { .. }) {
                report.ripples += 1;
            }
            self.apply_fusion_event(event, now);
        }

        if self.origin.poll_follow(now) {
            self.engine.on_origin_changed();
            let (x, y) = self.origin.position();
            self.engine.spawn_layer_from_current(now, x, y);
        }

        let overlay = self.fusion.overlay();

        let interval = 1.0 / self.settings.render_fps as f64;
        let last_render = *self.last_render.get_or_insert(now);
        if self.running && now - last_render >= interval {
            self.last_render = Some(now);
            self.render_raw(now);
            report.rendered = true;
            report.sent = self.send(now, &overlay);
        }

        let draw_due = self.last_draw.map_or(true, |last| now - last >= 1.0 / DRAW_FPS);
        if draw_due && self.preview.is_some() {
            self.last_draw = Some(now);
            if !report.rendered {
                self.render_raw(now);
            }
            self.draw(now, &overlay);
            report.drawn = true;
        }

        report
    }

    fn apply_fusion_event(&mut self, event: &FusionEvent, now: f64) {
        match *event {
            FusionEvent::SpawnRipple { x, y } => {
                let params = ParamSet::from(RIPPLE_PARAMS);
                self.engine.spawn_layer(RIPPLE_EFFECT_ID, Some(&params), x, y, now, TimeBase::Rel);
            }
            FusionEvent::DriveOrigin { x, y } => {
                self.origin.drive_from_tracking(x, y);
                self.engine.on_origin_changed();
            }
        }
    }

    fn render_raw(&mut self, now: f64) {
        let (ox, oy) = self.origin.position();
        self.engine.render_frame(now, ox, oy, self.layout.world(), &mut self.raw_frame);
    }

    fn send(&mut self, now: f64, overlay: &TrackingOverlay) -> Option<SendOutcome> {
        self.send_frame.copy_from_slice(&self.raw_frame);
        self.color
            .process(&mut self.send_frame, self.layout.world(), now, &self.settings.color, overlay);

        let outcome = self.link.as_mut()?.send_frame(&self.send_frame);
        match outcome {
            SendOutcome::Queued { .. } => self.refresh_status_sub(),
            SendOutcome::Dropped { drops } => tracing::trace!(drops, "frame dropped, send in flight"),
            SendOutcome::Closed => self.check_link(),
        }
        Some(outcome)
    }

    fn draw(&mut self, now: f64, overlay: &TrackingOverlay) {
        self.preview_frame.copy_from_slice(&self.raw_frame);
        self.color
            .process(&mut self.preview_frame, self.layout.world(), now, &self.settings.color, overlay);
        if let Some(preview) = self.preview.as_mut() {
            preview.draw(&self.preview_frame, self.layout.world(), self.origin.position());
        }
    }

    /// Stop the loop if the link thread reported a write failure
    fn check_link(&mut self) {
        let Some(link) = self.link.as_ref().filter(|l| l.has_failed()) else {
            return;
        };
        let detail = link.take_error().unwrap_or_default();
        tracing::error!(error = %detail, "frame link failed, stopping output");
        self.running = false;
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.status = "send error".to_string();
        self.status_sub = detail;
    }

    /// One-line summary of tracking, origin and link
    pub fn status_line(&self) -> String {
        let link = self.link_stats().map_or_else(|| "link: none".to_string(), |s| s.status_line());
        format!(
            "{} | {} | {} | {} layers | {:.0} fps",
            self.fusion.info(),
            self.origin.status_line(),
            link,
            self.engine.layer_count(),
            self.profiler.fps()
        )
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("status", &self.status)
            .field("running", &self.running)
            .field("engine", &self.engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::World;
    use crate::origin::OriginSource;
    use crate::output::FrameTransport;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct CaptureTransport {
        packets: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FrameTransport for CaptureTransport {
        fn write_packet(&mut self, packet: &[u8]) -> std::io::Result<()> {
            self.packets.lock().push(packet.to_vec());
            Ok(())
        }
    }

    struct FailingTransport;

    impl FrameTransport for FailingTransport {
        fn write_packet(&mut self, _packet: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    #[derive(Clone, Default)]
    struct CountingPreview {
        draws: Arc<Mutex<usize>>,
    }

    impl PreviewSink for CountingPreview {
        fn draw(&mut self, frame: &[u8], world: &World, _origin: (f64, f64)) {
            assert_eq!(frame.len(), world.frame_len());
            *self.draws.lock() += 1;
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn app() -> App {
        App::new(EngineSettings::default(), Arc::new(EffectRegistry::with_builtins()))
    }

    fn running_app(transport: impl FrameTransport) -> App {
        let mut app = app();
        app.attach_link(FrameLink::open(transport).unwrap(), 0.0);
        assert!(!app.start(0.1));
        assert!(app.start(1.0));
        app
    }

    #[test]
    fn test_render_cadence_skips_first_tick() {
        let transport = CaptureTransport::default();
        let mut app = running_app(transport.clone());

        let first = app.tick(1.0);
        assert!(!first.rendered);
        // 30 fps: 1/30 s must elapse since the first tick
        assert!(!app.tick(1.02).rendered);
        let r = app.tick(1.04);
        assert!(r.rendered);
        assert_eq!(r.sent, Some(SendOutcome::Queued { seq: 0 }));

        wait_until(|| transport.packets.lock().len() == 1);
        let packet = transport.packets.lock()[0].clone();
        assert_eq!(&packet[..2], b"NP");
        assert_eq!(packet.len(), 6 + 480 * 3);
        assert_eq!(&packet[6..], app.last_sent_frame());
        assert_eq!(app.status(), "running");
    }

    #[test]
    fn test_stopped_app_draws_preview_only() {
        let mut app = app();
        let preview = CountingPreview::default();
        app.set_preview(Box::new(preview.clone()));

        assert!(!app.start(0.0));
        let r = app.tick(0.0);
        assert!(!r.rendered && r.drawn);
        assert!(!app.tick(0.01).drawn);
        assert!(app.tick(0.04).drawn);
        assert_eq!(*preview.draws.lock(), 2);
    }

    #[test]
    fn test_send_error_stops_loop() {
        let mut app = running_app(FailingTransport);
        app.tick(1.0);
        assert!(app.tick(1.1).rendered);

        let mut stopped = false;
        for i in 0..500 {
            app.tick(1.2 + i as f64 * 0.05);
            if !app.is_running() {
                stopped = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(stopped);
        assert_eq!(app.status(), "send error");
        assert_eq!(app.status_sub(), "unplugged");
        assert!(app.link_stats().is_none());
        assert!(!app.start(100.0));
    }

    #[test]
    fn test_ripple_event_spawns_relative_layer() {
        let mut app = app();
        app.apply_fusion_event(&FusionEvent::SpawnRipple { x: 140.0, y: 0.0 }, 2.0);
        assert_eq!(app.engine().layer_count(), 1);
        let layer = &app.engine().layers()[0];
        assert_eq!(layer.effect_id, RIPPLE_EFFECT_ID);
        assert_eq!(layer.time_base, TimeBase::Rel);
        assert_eq!(layer.params.get("speed"), Some(260.0));
        assert_eq!(layer.params.get("baseR"), Some(0.0));
        assert_eq!((layer.origin_x, layer.origin_y), (140.0, 0.0));
    }

    #[test]
    fn test_tracking_overrides_follow() {
        let mut app = app();
        app.set_pointer(50.0, 20.0);
        app.set_follow(true, 0.0);
        assert_eq!(app.engine().layer_count(), 1);
        assert!(app.origin().is_following());

        app.apply_fusion_event(&FusionEvent::DriveOrigin { x: -300.0, y: 0.0 }, 0.1);
        assert!(!app.origin().is_following());
        assert_eq!(app.origin().source(), OriginSource::Tracking);

        app.tick(0.2);
        assert_eq!(app.origin().position(), (-300.0, 0.0));
        assert_eq!(app.engine().layer_count(), 1);
    }

    #[test]
    fn test_follow_spawns_on_tick() {
        let mut app = app();
        app.set_pointer(10.0, 0.0);
        app.set_follow(true, 0.0);
        app.tick(0.0);
        app.set_pointer(20.0, 0.0);
        app.tick(0.1);
        assert_eq!(app.origin().position(), (20.0, 0.0));
        assert_eq!(app.engine().layer_count(), 3);
    }

    #[test]
    fn test_empty_registry_renders_black() {
        let transport = CaptureTransport::default();
        let mut app = App::new(EngineSettings::default(), Arc::new(EffectRegistry::new()));
        app.attach_link(FrameLink::open(transport).unwrap(), 0.0);
        assert!(app.start(1.0));
        app.tick(1.0);
        assert!(app.tick(1.5).rendered);
        assert!(app.last_sent_frame().iter().all(|&b| b == 0));
        assert_eq!(app.engine().active_id(), None);
    }

    #[test]
    fn test_settings_applied_at_startup() {
        let mut settings = EngineSettings::default();
        settings.active_effect = Some("sparkle".to_string());
        settings.render_fps = 500;
        settings.snap_enabled = true;
        let mut app = App::new(settings, Arc::new(EffectRegistry::with_builtins()));
        assert_eq!(app.engine().active_id(), Some("sparkle"));
        assert_eq!(app.settings().render_fps, 60);

        app.set_origin_at_pointer(14.0, 26.0, false);
        assert_eq!(app.origin().position(), (10.0, 30.0));
        app.set_render_fps(5);
        assert_eq!(app.settings().render_fps, 10);
    }

    #[test]
    fn test_layout_round_trip_through_app() {
        let mut a = app();
        a.set_origin(33.0, -4.0);
        a.set_active_effect("orbitPulse");
        let doc = a.capture_layout();

        let mut b = app();
        b.apply_layout(&doc).unwrap();
        assert_eq!(b.origin().position(), (33.0, -4.0));
        assert_eq!(b.settings().active_effect.as_deref(), Some("orbitPulse"));

        b.origin_to_board(9);
        assert_eq!(b.origin().x(), b.layout().boards()[9].cx as f64);
    }

    #[test]
    fn test_status_strings() {
        let mut app = app();
        assert_eq!(app.status(), "idle");
        assert_eq!(app.status_sub(), "fps: --  seq: ----");
        app.attach_link(FrameLink::open(CaptureTransport::default()).unwrap(), 0.0);
        assert_eq!(app.status(), "connected");
        assert_eq!(app.status_sub(), "fps: 30  seq: 0000");
        app.disconnect();
        assert_eq!(app.status(), "idle");
        assert!(app.status_line().contains("link: none"));
    }
}
