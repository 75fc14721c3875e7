//! Neural person source
//!
//! Inference runs on the worker at a capped rate. Between inferences a
//! constant-velocity box tracker predicts where the person moved, matches the
//! last completed detection against the prediction and smooths toward it.

use crate::math::{clamp01, lerp};

use super::detector::{Detection, DetectorError, InferenceWorker, PersonDetector};
use super::types::{NormBox, RgbaFrame, TrackSample};

/// Inference requests per second
pub const INFER_FPS: f64 = 12.0;
/// Minimum IoU between prediction and detection to count as the same person
pub const IOU_MATCH: f64 = 0.20;
/// Smoothing of the velocity estimate toward the observed displacement
pub const VELOCITY_SMOOTHING: f64 = 0.35;
/// After this many misses any detection is accepted as a match
pub const REMATCH_AFTER_MISSES: u32 = 2;
/// The track is dropped after this many misses
pub const DROP_AFTER_MISSES: u32 = 10;

/// Box tracker output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersonResult {
    pub sample: TrackSample,
    /// Tracked box while a track exists
    pub bbox: Option<NormBox>,
}

/// Constant-velocity single-box tracker
#[derive(Debug, Clone, Default)]
pub struct BoxTracker {
    has: bool,
    bbox: NormBox,
    vx: f64,
    vy: f64,
    last_sec: Option<f64>,
    miss: u32,
}

impl BoxTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_track(&self) -> bool {
        self.has
    }

    pub fn misses(&self) -> u32 {
        self.miss
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    /// Advance to `now` and fold in the last completed detection
    pub fn update(&mut self, now: f64, detection: Option<&Detection>, smooth: f64) -> PersonResult {
        let dt = match self.last_sec {
            Some(last) => (now - last).max(1e-3),
            None => 1.0 / 60.0,
        };
        self.last_sec = Some(now);

        if self.has {
            self.bbox = self.bbox.translated(self.vx * dt, self.vy * dt).clamped();
        }

        match detection {
            Some(det) if !self.has => {
                self.bbox = det.bbox;
                self.vx = 0.0;
                self.vy = 0.0;
                self.has = true;
                self.miss = 0;
            }
            Some(det) => {
                if self.bbox.iou(&det.bbox) >= IOU_MATCH || self.miss >= REMATCH_AFTER_MISSES {
                    let (pcx, pcy) = self.bbox.center();
                    let (dcx, dcy) = det.bbox.center();
                    self.vx = lerp(self.vx, (dcx - pcx) / dt, VELOCITY_SMOOTHING);
                    self.vy = lerp(self.vy, (dcy - pcy) / dt, VELOCITY_SMOOTHING);
                    self.bbox = self.bbox.lerp(&det.bbox, smooth.clamp(0.0, 1.0));
                    self.miss = 0;
                } else {
                    self.miss += 1;
                }
            }
            None => {
                if self.has {
                    self.miss += 1;
                }
                if self.miss >= DROP_AFTER_MISSES {
                    self.has = false;
                }
            }
        }

        let det_conf = detection.map(|d| d.confidence).unwrap_or(0.0);
        let shown = if self.has { Some(self.bbox) } else { detection.map(|d| d.bbox) };
        let (x_norm, y_norm) = shown
            .map(|b| {
                let (cx, cy) = b.center();
                (clamp01(cx), clamp01(cy))
            })
            .unwrap_or((0.5, 0.5));

        if self.has {
            PersonResult {
                sample: TrackSample::present(x_norm, y_norm, det_conf),
                bbox: Some(self.bbox),
            }
        } else {
            PersonResult {
                sample: TrackSample { present: false, x_norm, y_norm, confidence: det_conf },
                bbox: None,
            }
        }
    }
}

/// Detector worker plus box tracker, polled once per fusion tick
pub struct PersonTracker {
    worker: InferenceWorker,
    tracker: BoxTracker,
    last_infer: Option<f64>,
    infer_fps: f64,
}

impl PersonTracker {
    pub fn new(detector: Box<dyn PersonDetector>) -> Result<Self, DetectorError> {
        Ok(Self {
            worker: InferenceWorker::spawn(detector)?,
            tracker: BoxTracker::new(),
            last_infer: None,
            infer_fps: INFER_FPS,
        })
    }

    pub fn set_infer_fps(&mut self, fps: f64) {
        self.infer_fps = fps;
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
        self.worker.clear();
        self.last_infer = None;
    }

    pub fn tracker(&self) -> &BoxTracker {
        &self.tracker
    }

    pub fn worker(&self) -> &InferenceWorker {
        &self.worker
    }

    /// Maybe start an inference on `frame`, then update the track from the
    /// last completed result
    pub fn tick(&mut self, now: f64, frame: &RgbaFrame, min_score: f64, smooth: f64) -> PersonResult {
        if !frame.is_valid() {
            return PersonResult { sample: TrackSample::absent(), bbox: None };
        }

        let interval = 1.0 / self.infer_fps.max(1.0);
        let due = self.last_infer.map_or(true, |last| now - last >= interval);
        if due && !self.worker.is_busy() && self.worker.try_submit(frame.clone(), min_score) {
            self.last_infer = Some(now);
        }

        let latest = self.worker.latest();
        self.tracker.update(now, latest.as_ref(), smooth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x0: f64, y0: f64, x1: f64, y1: f64, confidence: f64) -> Detection {
        Detection { confidence, bbox: NormBox::new(x0, y0, x1, y1) }
    }

    #[test]
    fn test_first_detection_snaps() {
        let mut t = BoxTracker::new();
        let d = det(0.2, 0.2, 0.4, 0.8, 0.9);
        let res = t.update(0.0, Some(&d), 0.25);
        assert!(res.sample.present);
        assert_eq!(res.bbox, Some(d.bbox));
        assert_relative_eq!(res.sample.x_norm, 0.3, epsilon = 1e-12);
        assert_eq!(res.sample.confidence, 0.9);
    }

    #[test]
    fn test_no_detection_absent_center() {
        let mut t = BoxTracker::new();
        let res = t.update(0.0, None, 0.25);
        assert_eq!(res.sample, TrackSample::absent());
    }

    #[test]
    fn test_matched_detection_smooths_and_learns_velocity() {
        let mut t = BoxTracker::new();
        t.update(0.0, Some(&det(0.2, 0.2, 0.4, 0.8, 0.9)), 0.5);
        let res = t.update(0.1, Some(&det(0.25, 0.2, 0.45, 0.8, 0.9)), 0.5);
        // Half way toward the detection
        assert_relative_eq!(res.bbox.unwrap().x0, 0.225, epsilon = 1e-12);
        let (vx, vy) = t.velocity();
        assert_relative_eq!(vx, 0.35 * 0.05 / 0.1, epsilon = 1e-9);
        assert_relative_eq!(vy, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prediction_moves_box_between_detections() {
        let mut t = BoxTracker::new();
        t.update(0.0, Some(&det(0.2, 0.2, 0.4, 0.8, 0.9)), 1.0);
        t.update(0.1, Some(&det(0.3, 0.2, 0.5, 0.8, 0.9)), 1.0);
        let (vx, _) = t.velocity();
        assert!(vx > 0.0);
        let res = t.update(0.2, None, 1.0);
        assert!(res.sample.present);
        assert!(res.bbox.unwrap().x0 > 0.3);
        assert_eq!(t.misses(), 1);
    }

    #[test]
    fn test_unmatched_detection_counts_miss_then_rematches() {
        let mut t = BoxTracker::new();
        let left = det(0.0, 0.0, 0.2, 0.5, 0.9);
        let right = det(0.7, 0.0, 0.9, 0.5, 0.8);
        t.update(0.0, Some(&left), 0.5);

        t.update(0.1, Some(&right), 0.5);
        assert_eq!(t.misses(), 1);
        t.update(0.2, Some(&right), 0.5);
        assert_eq!(t.misses(), 2);
        // After two misses the far detection is accepted
        let res = t.update(0.3, Some(&right), 0.5);
        assert_eq!(t.misses(), 0);
        assert!(res.bbox.unwrap().x0 > 0.3);
    }

    #[test]
    fn test_track_dropped_after_ten_misses() {
        let mut t = BoxTracker::new();
        t.update(0.0, Some(&det(0.4, 0.4, 0.6, 0.6, 0.9)), 0.5);
        for i in 1..10 {
            assert!(t.update(i as f64 * 0.1, None, 0.5).sample.present);
        }
        let res = t.update(1.0, None, 0.5);
        assert!(!res.sample.present);
        assert!(!t.has_track());
    }

    struct ConstantDetector(Detection);

    impl PersonDetector for ConstantDetector {
        fn detect(&mut self, _frame: &RgbaFrame, min_score: f64) -> Result<Option<Detection>, DetectorError> {
            Ok((self.0.confidence >= min_score).then_some(self.0))
        }
    }

    #[test]
    fn test_person_tracker_polls_worker() {
        let d = det(0.4, 0.1, 0.6, 0.9, 0.8);
        let mut tracker = PersonTracker::new(Box::new(ConstantDetector(d))).unwrap();
        let frame = RgbaFrame::solid(8, 8, [0, 0, 0, 255]);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut now = 0.0;
        loop {
            let res = tracker.tick(now, &frame, 0.5, 0.25);
            if res.sample.present {
                assert_relative_eq!(res.sample.x_norm, 0.5, epsilon = 1e-9);
                break;
            }
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::thread::sleep(std::time::Duration::from_millis(2));
            now += 0.1;
        }
    }

    struct GatedDetector {
        gate: crossbeam_channel::Receiver<Detection>,
    }

    impl PersonDetector for GatedDetector {
        fn detect(&mut self, _frame: &RgbaFrame, _min_score: f64) -> Result<Option<Detection>, DetectorError> {
            Ok(self.gate.recv().ok())
        }
    }

    #[test]
    fn test_reset_discards_inference_in_flight() {
        let (gate, rx) = crossbeam_channel::unbounded();
        let mut tracker = PersonTracker::new(Box::new(GatedDetector { gate: rx })).unwrap();
        let frame = RgbaFrame::solid(8, 8, [0, 0, 0, 255]);

        assert!(!tracker.tick(0.0, &frame, 0.5, 0.25).sample.present);
        assert!(tracker.worker().is_busy());
        tracker.reset();

        // The request started before the reset finishes afterwards
        gate.send(det(0.7, 0.1, 0.9, 0.9, 0.9)).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while tracker.worker().completed() < 1 {
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        assert_eq!(tracker.worker().latest(), None);
        let res = tracker.tick(10.0, &frame, 0.5, 0.25);
        assert!(!res.sample.present);
        assert!(!tracker.tracker().has_track());

        // Requests made after the reset still deliver
        for _ in 0..4 {
            gate.send(det(0.1, 0.1, 0.3, 0.9, 0.9)).unwrap();
        }
        let mut now = 10.0;
        while tracker.worker().latest().is_none() {
            now += 0.1;
            tracker.tick(now, &frame, 0.5, 0.25);
            assert!(std::time::Instant::now() < deadline, "timed out");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        drop(gate);
    }
}
