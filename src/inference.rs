// Detection side of the face analysis capability

use crate::camera::VideoSurface;
use crate::error::Result;
use crate::loader::LoadedModels;
use crate::models::FaceDetection;
use async_trait::async_trait;

/// Single-face detection with landmarks and expressions
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    /// Analyzes the frame currently shown on `surface`.
    ///
    /// Returns `Ok(None)` when no face is found.
    async fn detect_single_face(
        &self,
        models: &LoadedModels,
        surface: &dyn VideoSurface,
    ) -> Result<Option<FaceDetection>>;
}
