//! Person detector seam and single-slot inference worker
//!
//! A [`PersonDetector`] turns one camera frame into at most one person box.
//! Backends that only produce raw YOLO output tensors can wrap a
//! [`TensorModel`] in [`YoloDetector`], which does the letterboxing,
//! decoding and non-maximum suppression.
//!
//! The [`InferenceWorker`] owns a detector on its own thread. At most one
//! request is outstanding; callers poll the last completed result and never
//! block on inference.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::types::{NormBox, RgbaFrame};

/// Square model input edge in pixels
pub const MODEL_INPUT_SIZE: u32 = 640;
/// Letterbox padding gray
pub const LETTERBOX_FILL: u8 = 114;
pub const NMS_IOU_THRESHOLD: f64 = 0.45;
pub const NMS_TOP_K: usize = 20;
/// Boxes narrower or shorter than this (source pixels) are discarded
pub const MIN_BOX_PX: f64 = 6.0;

/// Detector errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DetectorError {
    #[error("failed to load detector: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("failed to spawn inference thread: {0}")]
    Spawn(String),
}

/// Best person detection for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub confidence: f64,
    /// Normalized to the source frame
    pub bbox: NormBox,
}

/// Single-person detector
pub trait PersonDetector: Send + 'static {
    /// Detect the highest-scoring person with score at least `min_score`
    fn detect(&mut self, frame: &RgbaFrame, min_score: f64) -> Result<Option<Detection>, DetectorError>;
}

/// Raw output tensor of a detection model
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub data: Vec<f32>,
    pub dims: Vec<usize>,
}

/// A model taking a `[1, 3, S, S]` float input and producing one output tensor
pub trait TensorModel: Send + 'static {
    fn run(&mut self, input: &[f32], size: u32) -> Result<OutputTensor, DetectorError>;
}

/// Letterbox placement of a source frame inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub src_w: u32,
    pub src_h: u32,
    pub scale: f64,
    pub new_w: u32,
    pub new_h: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn new(src_w: u32, src_h: u32, size: u32) -> Self {
        let s = size as f64;
        let scale = (s / src_w.max(1) as f64).min(s / src_h.max(1) as f64);
        let new_w = ((src_w as f64 * scale).round() as u32).min(size);
        let new_h = ((src_h as f64 * scale).round() as u32).min(size);
        Self {
            size,
            src_w,
            src_h,
            scale,
            new_w,
            new_h,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
        }
    }

    /// Planar RGB input in [0, 1], nearest-neighbour resampled
    pub fn to_chw(&self, frame: &RgbaFrame) -> Vec<f32> {
        let size = self.size as usize;
        let area = size * size;
        let fill = LETTERBOX_FILL as f32 / 255.0;
        let mut chw = vec![fill; 3 * area];
        if !frame.is_valid() || self.new_w == 0 || self.new_h == 0 {
            return chw;
        }

        for y in 0..self.new_h {
            let sy = (y as u64 * frame.height as u64 / self.new_h as u64) as u32;
            for x in 0..self.new_w {
                let sx = (x as u64 * frame.width as u64 / self.new_w as u64) as u32;
                let [r, g, b, _] = frame.pixel(sx, sy);
                let i = (y + self.pad_y) as usize * size + (x + self.pad_x) as usize;
                chw[i] = r as f32 / 255.0;
                chw[i + area] = g as f32 / 255.0;
                chw[i + 2 * area] = b as f32 / 255.0;
            }
        }
        chw
    }
}

/// Candidate box in source-frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub score: f64,
}

impl ScoredBox {
    fn as_norm_box(&self) -> NormBox {
        NormBox::new(self.x0, self.y0, self.x1, self.y1)
    }
}

/// Decode person candidates from a YOLO output tensor
///
/// Accepts `[1, attrs, anchors]` and `[1, anchors, attrs]` layouts. An 85-wide
/// attribute row carries an objectness column before the class scores. Only
/// class 0 (person) is scored.
pub fn decode_yolo(tensor: &OutputTensor, letterbox: &Letterbox, min_score: f64) -> Vec<ScoredBox> {
    if tensor.dims.len() < 3 {
        return Vec::new();
    }
    let (d1, d2) = (tensor.dims[1], tensor.dims[2]);
    let (rows, cols, transposed) = if d1 <= 100 && d2 >= 1000 {
        (d2, d1, true)
    } else {
        (d1, d2, false)
    };
    if tensor.data.len() < rows * cols {
        tracing::warn!(len = tensor.data.len(), rows, cols, "detector output shorter than its dims");
        return Vec::new();
    }

    let has_obj = cols == 85;
    let class_offset = if has_obj { 5 } else { 4 };
    if cols <= class_offset {
        return Vec::new();
    }

    let s = letterbox.size as f64;
    let (w, h) = (letterbox.src_w as f64, letterbox.src_h as f64);
    let get = |r: usize, c: usize| -> f64 {
        let v = if transposed { tensor.data[c * rows + r] } else { tensor.data[r * cols + c] };
        v as f64
    };

    let mut boxes = Vec::new();
    for r in 0..rows {
        let (cx, cy, bw, bh) = (get(r, 0), get(r, 1), get(r, 2), get(r, 3));
        if !(bw > 0.0 && bh > 0.0) {
            continue;
        }
        let obj = if has_obj { get(r, 4) } else { 1.0 };
        let score = obj * get(r, class_offset);
        if !(score >= min_score) {
            continue;
        }

        let unmap_x = |v: f64| ((v - letterbox.pad_x as f64) / letterbox.scale).clamp(0.0, w);
        let unmap_y = |v: f64| ((v - letterbox.pad_y as f64) / letterbox.scale).clamp(0.0, h);
        let x0 = unmap_x(cx - bw * 0.5);
        let x1 = unmap_x(cx + bw * 0.5);
        let y0 = unmap_y(cy - bh * 0.5);
        let y1 = unmap_y(cy + bh * 0.5);

        if x1 - x0 < MIN_BOX_PX || y1 - y0 < MIN_BOX_PX {
            continue;
        }
        if !(x0 + y0 + x1 + y1).is_finite() {
            continue;
        }
        if cx < -s || cy < -s || cx > s * 2.0 || cy > s * 2.0 {
            continue;
        }

        boxes.push(ScoredBox { x0, y0, x1, y1, score });
    }
    boxes
}

/// Greedy non-maximum suppression, highest score first
pub fn nms(boxes: &[ScoredBox], iou_threshold: f64, top_k: usize) -> Vec<ScoredBox> {
    let mut sorted = boxes.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<ScoredBox> = Vec::new();
    for candidate in sorted {
        if keep.len() >= top_k {
            break;
        }
        let overlaps = keep
            .iter()
            .any(|k| candidate.as_norm_box().iou(&k.as_norm_box()) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Decode, suppress and normalize the best box of one inference
pub fn best_detection(tensor: &OutputTensor, letterbox: &Letterbox, min_score: f64) -> Option<Detection> {
    let boxes = decode_yolo(tensor, letterbox, min_score);
    let best = nms(&boxes, NMS_IOU_THRESHOLD, NMS_TOP_K).into_iter().next()?;
    let (w, h) = (letterbox.src_w.max(1) as f64, letterbox.src_h.max(1) as f64);
    Some(Detection {
        confidence: best.score,
        bbox: NormBox::new(best.x0 / w, best.y0 / h, best.x1 / w, best.y1 / h).clamped(),
    })
}

/// [`PersonDetector`] over a raw-tensor YOLO model
pub struct YoloDetector<M: TensorModel> {
    model: M,
    input_size: u32,
}

impl<M: TensorModel> YoloDetector<M> {
    pub fn new(model: M) -> Self {
        Self { model, input_size: MODEL_INPUT_SIZE }
    }

    pub fn with_input_size(model: M, input_size: u32) -> Self {
        Self { model, input_size: input_size.max(32) }
    }
}

impl<M: TensorModel> PersonDetector for YoloDetector<M> {
    fn detect(&mut self, frame: &RgbaFrame, min_score: f64) -> Result<Option<Detection>, DetectorError> {
        if !frame.is_valid() {
            return Ok(None);
        }
        let letterbox = Letterbox::new(frame.width, frame.height, self.input_size);
        let input = letterbox.to_chw(frame);
        let output = self.model.run(&input, self.input_size)?;
        Ok(best_detection(&output, &letterbox, min_score))
    }
}

struct InferenceRequest {
    frame: RgbaFrame,
    min_score: f64,
    generation: u64,
}

/// Background thread running one detector, one request at a time
pub struct InferenceWorker {
    request_sender: Option<Sender<InferenceRequest>>,
    busy: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<Detection>>>,
    completed: Arc<AtomicU64>,
    /// Bumped by `clear`; results of requests from an older generation are dropped
    generation: Arc<AtomicU64>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl InferenceWorker {
    pub fn spawn(detector: Box<dyn PersonDetector>) -> Result<Self, DetectorError> {
        let (request_sender, request_receiver) = crossbeam_channel::bounded::<InferenceRequest>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(None));
        let completed = Arc::new(AtomicU64::new(0));
        let generation = Arc::new(AtomicU64::new(0));

        let thread_handle = {
            let busy = busy.clone();
            let latest = latest.clone();
            let completed = completed.clone();
            let generation = generation.clone();
            std::thread::Builder::new()
                .name("person-inference".to_string())
                .spawn(move || {
                    Self::inference_thread(detector, request_receiver, busy, latest, completed, generation);
                })
                .map_err(|e| DetectorError::Spawn(e.to_string()))?
        };

        Ok(Self {
            request_sender: Some(request_sender),
            busy,
            latest,
            completed,
            generation,
            thread_handle: Some(thread_handle),
        })
    }

    fn inference_thread(
        mut detector: Box<dyn PersonDetector>,
        request_receiver: Receiver<InferenceRequest>,
        busy: Arc<AtomicBool>,
        latest: Arc<Mutex<Option<Detection>>>,
        completed: Arc<AtomicU64>,
        generation: Arc<AtomicU64>,
    ) {
        tracing::info!("person inference thread started");
        while let Ok(request) = request_receiver.recv() {
            let result = match detector.detect(&request.frame, request.min_score) {
                Ok(det) => det,
                Err(e) => {
                    tracing::warn!(error = %e, "person inference failed");
                    None
                }
            };
            {
                // Checked under the slot lock so a concurrent `clear` cannot interleave
                let mut slot = latest.lock();
                if request.generation == generation.load(Ordering::Acquire) {
                    *slot = result;
                } else {
                    tracing::debug!("discarding inference result from before reset");
                }
            }
            completed.fetch_add(1, Ordering::AcqRel);
            busy.store(false, Ordering::Release);
        }
        tracing::info!("person inference thread stopped");
    }

    /// Hand a frame to the worker unless a request is already running
    pub fn try_submit(&self, frame: RgbaFrame, min_score: f64) -> bool {
        let Some(sender) = self.request_sender.as_ref() else {
            return false;
        };
        if self.busy.swap(true, Ordering::AcqRel) {
            return false;
        }
        let generation = self.generation.load(Ordering::Acquire);
        if sender.try_send(InferenceRequest { frame, min_score, generation }).is_err() {
            self.busy.store(false, Ordering::Release);
            return false;
        }
        true
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Result of the most recently completed inference
    pub fn latest(&self) -> Option<Detection> {
        *self.latest.lock()
    }

    /// Number of inferences finished, successful or not
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Forget the last result and any result still being computed
    pub fn clear(&self) {
        let mut slot = self.latest.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *slot = None;
    }

    pub fn shutdown(&mut self) {
        self.request_sender = None;
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("person inference thread panicked");
            }
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
