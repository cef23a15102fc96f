use crate::config::DetectionConfig;
use crate::error::{Error, Result};
use crate::models::{BoundingBox, RawDetection};
use crate::onnx::{self, InferenceProvider, OrtRuntimeConfig};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayView2, Axis, Ix3};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Anything that turns an image into labelled boxes.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>>;
}

/// DETR-family detector exported to ONNX (`pixel_values` in; `logits` and
/// `pred_boxes` out).
pub struct DetrDetector {
    session: Mutex<Session>,
    labels: Vec<String>,
    provider: InferenceProvider,
    score_threshold: f32,
    short_side: u32,
    long_side: u32,
}

impl DetrDetector {
    pub fn load(model_path: &Path, config: &DetectionConfig) -> Result<Self> {
        let labels = match onnx::resolve_sidecar(model_path, "labels.txt") {
            Some(path) => onnx::load_lines(&path)?,
            None => {
                log::warn!(
                    "No labels sidecar for detection model {}; classes will be unnamed",
                    model_path.display()
                );
                Vec::new()
            }
        };
        let (session, provider) = onnx::build_session(
            model_path,
            OrtRuntimeConfig {
                provider: config.provider,
                device_id: config.device_id,
            },
        )?;
        log::info!(
            "Loaded detection model {} on {} ({} labels)",
            model_path.display(),
            provider.label(),
            labels.len()
        );
        Ok(Self {
            session: Mutex::new(session),
            labels,
            provider,
            score_threshold: config.detection_score_threshold,
            short_side: config.detection_short_side,
            long_side: config.detection_long_side,
        })
    }

    pub fn provider(&self) -> InferenceProvider {
        self.provider
    }

    fn run(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let (w, h) = resize_dims(image.width(), image.height(), self.short_side, self.long_side);
        let input = preprocess(image, w, h);
        let tensor = TensorRef::from_array_view(&input)
            .map_err(|e| Error::Inference(format!("Invalid detection tensor: {e}")))?;

        let mut session = self.session.lock().map_err(|_| Error::Lock)?;
        let outputs = session
            .run(ort::inputs!["pixel_values" => tensor])
            .map_err(|e| Error::Inference(format!("Failed to run detection model: {e}")))?;
        let logits = outputs["logits"]
            .try_extract_array::<f32>()
            .map_err(|e| Error::Inference(format!("{e}")))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::Inference(format!("Unexpected logits shape: {e}")))?;
        let boxes = outputs["pred_boxes"]
            .try_extract_array::<f32>()
            .map_err(|e| Error::Inference(format!("{e}")))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::Inference(format!("Unexpected box shape: {e}")))?;

        Ok(decode_queries(
            logits.index_axis(Axis(0), 0),
            boxes.index_axis(Axis(0), 0),
            &self.labels,
            self.score_threshold,
            image.width(),
            image.height(),
        ))
    }
}

impl Detector for DetrDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let detections = onnx::safe_run(|| self.run(image))?;
        log::info!("Detector returned {} objects", detections.len());
        Ok(detections)
    }
}

/// Scales so the short side hits `short` unless that pushes the long side past
/// `long`.
pub fn resize_dims(width: u32, height: u32, short: u32, long: u32) -> (u32, u32) {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let mut scale = short as f32 / w.min(h);
    if w.max(h) * scale > long as f32 {
        scale = long as f32 / w.max(h);
    }
    let scaled = |v: f32| ((v * scale).round() as u32).max(1);
    (scaled(w), scaled(h))
}

fn preprocess(image: &DynamicImage, w: u32, h: u32) -> Array4<f32> {
    let resized = image.resize_exact(w, h, FilterType::Triangle).to_rgb8();
    let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            input[[0, c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    input
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max_val = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; values.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

/// Turns per-query class logits (`[Q, C+1]`, last column = no object) and
/// normalized `cx, cy, w, h` boxes (`[Q, 4]`) into pixel-space detections.
pub fn decode_queries(
    logits: ArrayView2<'_, f32>,
    boxes: ArrayView2<'_, f32>,
    labels: &[String],
    threshold: f32,
    image_w: u32,
    image_h: u32,
) -> Vec<RawDetection> {
    let (img_w, img_h) = (image_w as f32, image_h as f32);
    let mut out = Vec::new();
    for (query, row) in logits.outer_iter().enumerate() {
        let row: Vec<f32> = row.iter().copied().collect();
        if row.len() < 2 {
            continue;
        }
        let probs = softmax(&row);
        let Some((class_id, score)) = probs[..probs.len() - 1]
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        if score < threshold {
            continue;
        }
        let Some(b) = boxes.outer_iter().nth(query) else {
            continue;
        };
        if b.len() < 4 {
            continue;
        }
        let (cx, cy, bw, bh) = (b[0], b[1], b[2], b[3]);
        let label = labels
            .get(class_id)
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{class_id}"));
        out.push(RawDetection {
            label,
            score,
            bbox: BoundingBox {
                xmin: ((cx - bw / 2.0) * img_w).round(),
                ymin: ((cy - bh / 2.0) * img_h).round(),
                xmax: ((cx + bw / 2.0) * img_w).round(),
                ymax: ((cy + bh / 2.0) * img_h).round(),
            },
        });
    }
    out
}
