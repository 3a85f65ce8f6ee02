// ONNX Runtime backed face analysis: detector, landmarks, recognition and expressions

use crate::camera::VideoSurface;
use crate::error::{MoodDetectorError, Result};
use crate::inference::FaceAnalyzer;
use crate::loader::{LoadedModels, ModelKind, ModelNets};
use crate::models::{BoundingBox, ExpressionScores, FaceDetection, Frame, Point};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Square input side of the SSD face detector
const DETECTOR_INPUT: u32 = 300;

/// Square input side of the landmark and expression nets
const FACE_INPUT: u32 = 112;

const LANDMARK_COUNT: usize = 68;

type Sessions = Arc<Mutex<HashMap<ModelKind, Session>>>;

/// Face analysis over ONNX models stored as `<base>/<model name>.onnx`
pub struct OnnxFaceAnalyzer {
    sessions: Sessions,
    min_confidence: f32,
}

impl OnnxFaceAnalyzer {
    /// Creates an analyzer with no models loaded
    pub fn new(min_confidence: f32) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            min_confidence,
        }
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(&kind))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ModelNets for OnnxFaceAnalyzer {
    async fn load_from_uri(&self, kind: ModelKind, base_path: &str) -> Result<()> {
        let path = Path::new(base_path).join(kind.artifact_file());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| MoodDetectorError::ModelLoad {
                model: kind,
                reason: format!("{}: {e}", path.display()),
            })?;

        let session = tokio::task::spawn_blocking(move || -> ort::Result<Session> {
            Session::builder()?.commit_from_memory(&bytes)
        })
        .await
        .map_err(|e| MoodDetectorError::ModelLoad {
            model: kind,
            reason: format!("loader task failed: {e}"),
        })?
        .map_err(|e| {
            error!("Failed to load ONNX model {}: {}", kind, e);
            MoodDetectorError::ModelLoad {
                model: kind,
                reason: e.to_string(),
            }
        })?;

        self.sessions
            .lock()
            .map_err(|_| MoodDetectorError::ModelLoad {
                model: kind,
                reason: "session table lock poisoned".to_string(),
            })?
            .insert(kind, session);
        info!("ONNX session ready for {}", kind);
        Ok(())
    }
}

#[async_trait]
impl FaceAnalyzer for OnnxFaceAnalyzer {
    async fn detect_single_face(
        &self,
        models: &LoadedModels,
        surface: &dyn VideoSurface,
    ) -> Result<Option<FaceDetection>> {
        let frame = surface.current_frame().ok_or_else(|| {
            MoodDetectorError::Inference("no frame on the video surface".to_string())
        })?;
        debug!(
            "Analyzing {}x{} frame with models from {}",
            frame.width,
            frame.height,
            models.base_path()
        );

        let sessions = self.sessions.clone();
        let min_confidence = self.min_confidence;
        tokio::task::spawn_blocking(move || analyze(&sessions, &frame, min_confidence))
            .await
            .map_err(|e| MoodDetectorError::Inference(format!("inference task failed: {e}")))?
    }
}

fn analyze(
    sessions: &Sessions,
    frame: &Frame,
    min_confidence: f32,
) -> Result<Option<FaceDetection>> {
    if frame.width == 0 || frame.height == 0 {
        return Err(MoodDetectorError::Inference("empty frame".to_string()));
    }
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
        || MoodDetectorError::Inference("frame buffer does not match its dimensions".to_string()),
    )?;

    let mut sessions = sessions
        .lock()
        .map_err(|_| MoodDetectorError::Inference("session table lock poisoned".to_string()))?;

    let detector = session(&mut sessions, ModelKind::SsdMobilenetv1)?;
    let Some(bounding_box) = detect_face(detector, &image, min_confidence)? else {
        return Ok(None);
    };

    let face = crop_face(&image, &bounding_box);
    let landmarks = detect_landmarks(
        session(&mut sessions, ModelKind::FaceLandmark68)?,
        &face,
        &bounding_box,
    )?;
    let expressions =
        classify_expressions(session(&mut sessions, ModelKind::FaceExpression)?, &face)?;

    Ok(Some(FaceDetection {
        bounding_box,
        landmarks,
        expressions,
    }))
}

fn session(sessions: &mut HashMap<ModelKind, Session>, kind: ModelKind) -> Result<&mut Session> {
    sessions
        .get_mut(&kind)
        .ok_or_else(|| MoodDetectorError::Inference(format!("{kind} is not loaded")))
}

/// Runs the SSD detector and keeps the best box above `min_confidence`.
///
/// Outputs: boxes `[1, N, 4]` as normalized (ymin, xmin, ymax, xmax), scores `[1, N]`.
fn detect_face(
    session: &mut Session,
    image: &RgbImage,
    min_confidence: f32,
) -> Result<Option<BoundingBox>> {
    let resized = imageops::resize(image, DETECTOR_INPUT, DETECTOR_INPUT, FilterType::Triangle);
    let outputs = run(session, to_chw_tensor(&resized)?)?;
    let (boxes, scores) = match outputs.as_slice() {
        [boxes, scores, ..] => (boxes, scores),
        _ => {
            return Err(MoodDetectorError::Inference(
                "face detector must produce boxes and scores".to_string(),
            ))
        }
    };

    let best = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let Some((index, &score)) = best else {
        return Ok(None);
    };
    if score < min_confidence {
        debug!("Best face score {:.2} below {:.2}", score, min_confidence);
        return Ok(None);
    }

    let coords = boxes.get(index * 4..index * 4 + 4).ok_or_else(|| {
        MoodDetectorError::Inference("face detector box count does not match scores".to_string())
    })?;
    Ok(Some(to_pixel_box(coords, score, image.width(), image.height())))
}

fn to_pixel_box(coords: &[f32], score: f32, width: u32, height: u32) -> BoundingBox {
    let (w, h) = (width as f32, height as f32);
    let y_min = coords[0].clamp(0.0, 1.0) * h;
    let x_min = coords[1].clamp(0.0, 1.0) * w;
    let y_max = coords[2].clamp(0.0, 1.0) * h;
    let x_max = coords[3].clamp(0.0, 1.0) * w;
    BoundingBox {
        x: x_min,
        y: y_min,
        width: (x_max - x_min).max(1.0),
        height: (y_max - y_min).max(1.0),
        score,
    }
}

/// Crops the face and resizes it to the face-net input size
fn crop_face(image: &RgbImage, face: &BoundingBox) -> RgbImage {
    let x = (face.x as u32).min(image.width().saturating_sub(1));
    let y = (face.y as u32).min(image.height().saturating_sub(1));
    let width = (face.width as u32).clamp(1, image.width() - x);
    let height = (face.height as u32).clamp(1, image.height() - y);

    let crop = imageops::crop_imm(image, x, y, width, height).to_image();
    imageops::resize(&crop, FACE_INPUT, FACE_INPUT, FilterType::Triangle)
}

/// 68 (x, y) pairs normalized to the face crop, mapped back to frame pixels
fn detect_landmarks(
    session: &mut Session,
    face: &RgbImage,
    bounding_box: &BoundingBox,
) -> Result<Vec<Point>> {
    let outputs = run(session, to_chw_tensor(face)?)?;
    let coords = outputs
        .first()
        .filter(|coords| coords.len() >= LANDMARK_COUNT * 2)
        .ok_or_else(|| {
            MoodDetectorError::Inference("landmark net must produce 136 values".to_string())
        })?;

    Ok(coords
        .chunks_exact(2)
        .take(LANDMARK_COUNT)
        .map(|pair| Point {
            x: bounding_box.x + pair[0] * bounding_box.width,
            y: bounding_box.y + pair[1] * bounding_box.height,
        })
        .collect())
}

fn classify_expressions(session: &mut Session, face: &RgbImage) -> Result<ExpressionScores> {
    let outputs = run(session, to_chw_tensor(face)?)?;
    let logits = outputs
        .first()
        .ok_or_else(|| MoodDetectorError::Inference("No output from model".to_string()))?;
    Ok(ExpressionScores::from_probabilities(&softmax(logits)))
}

/// Converts logits to probabilities
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

/// HWC RGB bytes to a `[1, 3, H, W]` tensor normalized to [0, 1]
fn to_chw_tensor(image: &RgbImage) -> Result<Array4<f32>> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut chw = vec![0.0f32; 3 * height * width];
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            chw[c * height * width + y * width + x] = pixel[c] as f32 / 255.0;
        }
    }
    Array4::from_shape_vec((1, 3, height, width), chw)
        .map_err(|e| MoodDetectorError::Inference(format!("Failed to create input array: {e}")))
}

/// Runs `session` on one input and flattens every output
fn run(session: &mut Session, input: Array4<f32>) -> Result<Vec<Vec<f32>>> {
    let input_tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![input_tensor]).map_err(|e| {
        error!("ONNX inference failed: {}", e);
        MoodDetectorError::Inference(format!("Inference failed: {e}"))
    })?;

    outputs
        .iter()
        .map(|(_, value)| -> Result<Vec<f32>> {
            let (_, data) = value.try_extract_tensor::<f32>()?;
            Ok(data.to_vec())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one_and_keeps_order() {
        let probabilities = softmax(&[1.0, 3.0, 0.5]);
        let total: f32 = probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(probabilities[1] > probabilities[0]);
        assert!(probabilities[0] > probabilities[2]);
    }

    #[test]
    fn chw_tensor_splits_channels() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        image.put_pixel(1, 0, image::Rgb([0, 255, 0]));

        let tensor = to_chw_tensor(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 1]], 1.0);
        assert_eq!(tensor[[0, 2, 0, 0]], 0.0);
    }

    #[test]
    fn pixel_box_is_clamped_to_frame() {
        let b = to_pixel_box(&[-0.1, 0.25, 0.5, 1.2], 0.9, 640, 480);
        assert_eq!(b.x, 160.0);
        assert_eq!(b.y, 0.0);
        assert_eq!(b.width, 480.0);
        assert_eq!(b.height, 240.0);
    }

    #[test]
    fn crop_stays_inside_image() {
        let image = RgbImage::new(100, 80);
        let face = BoundingBox {
            x: 90.0,
            y: 70.0,
            width: 50.0,
            height: 50.0,
            score: 0.9,
        };
        let crop = crop_face(&image, &face);
        assert_eq!(crop.dimensions(), (FACE_INPUT, FACE_INPUT));
    }

    #[tokio::test]
    async fn missing_model_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = OnnxFaceAnalyzer::new(0.5);
        let err = analyzer
            .load_from_uri(ModelKind::FaceExpression, dir.path().to_str().unwrap())
            .await
            .unwrap_err();
        match err {
            MoodDetectorError::ModelLoad { model, reason } => {
                assert_eq!(model, ModelKind::FaceExpression);
                assert!(reason.contains("face_expression.onnx"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!analyzer.is_loaded(ModelKind::FaceExpression));
    }
}
