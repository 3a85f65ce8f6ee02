// Model loading for the face analysis capability

use crate::cancel::{bounded, CancellationToken};
use crate::error::{MoodDetectorError, Result};
use crate::session::Stage;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

/// The four artifacts the face analysis capability needs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// SSD MobileNet v1 face detector
    SsdMobilenetv1,
    FaceLandmark68,
    FaceRecognition,
    FaceExpression,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::SsdMobilenetv1,
        ModelKind::FaceLandmark68,
        ModelKind::FaceRecognition,
        ModelKind::FaceExpression,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::SsdMobilenetv1 => "ssd_mobilenetv1",
            ModelKind::FaceLandmark68 => "face_landmark_68",
            ModelKind::FaceRecognition => "face_recognition",
            ModelKind::FaceExpression => "face_expression",
        }
    }

    /// ONNX file name of this artifact under the model base path
    pub fn artifact_file(self) -> String {
        format!("{}.onnx", self.name())
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Network-loading side of the face analysis capability
#[async_trait]
pub trait ModelNets: Send + Sync {
    /// Fetches and installs one artifact from `base_path`
    async fn load_from_uri(&self, kind: ModelKind, base_path: &str) -> Result<()>;
}

/// Proof that all four artifacts were installed.
///
/// Only [`ModelLoader::load_models`] creates it, and inference requires a
/// reference to it.
#[derive(Debug, Clone)]
pub struct LoadedModels {
    base_path: String,
}

impl LoadedModels {
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

/// Loads the model set from a fixed base path
pub struct ModelLoader {
    base_path: String,
    timeout: Duration,
}

impl ModelLoader {
    /// Creates a new ModelLoader
    pub fn new(base_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_path: base_path.into(),
            timeout,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Loads all four artifacts concurrently.
    ///
    /// Any single failure fails the whole set; nothing is retried.
    pub async fn load_models(
        &self,
        nets: &dyn ModelNets,
        token: &CancellationToken,
    ) -> Result<LoadedModels> {
        info!("Loading models from {}", self.base_path);

        let loaded = tokio::try_join!(
            self.load_one(nets, ModelKind::SsdMobilenetv1, token),
            self.load_one(nets, ModelKind::FaceLandmark68, token),
            self.load_one(nets, ModelKind::FaceRecognition, token),
            self.load_one(nets, ModelKind::FaceExpression, token),
        );

        match loaded {
            Ok(_) => {
                info!("Models loaded successfully");
                Ok(LoadedModels {
                    base_path: self.base_path.clone(),
                })
            }
            Err(e) => {
                error!("Error loading models: {}", e);
                Err(e)
            }
        }
    }

    async fn load_one(
        &self,
        nets: &dyn ModelNets,
        kind: ModelKind,
        token: &CancellationToken,
    ) -> Result<()> {
        let result = bounded(
            Stage::ModelLoad,
            self.timeout,
            token,
            nets.load_from_uri(kind, &self.base_path),
        )
        .await;

        match result {
            Ok(()) => {
                info!("Loaded {}", kind);
                Ok(())
            }
            Err(e @ MoodDetectorError::ModelLoad { .. }) => Err(e),
            Err(e @ MoodDetectorError::Cancelled { .. }) => Err(e),
            Err(MoodDetectorError::Timeout { .. }) => Err(MoodDetectorError::ModelLoad {
                model: kind,
                reason: format!("timed out after {:?}", self.timeout),
            }),
            Err(e) => Err(MoodDetectorError::ModelLoad {
                model: kind,
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeModelNets;

    #[tokio::test]
    async fn loads_all_four_artifacts() {
        let nets = FakeModelNets::default();
        let loader = ModelLoader::new("/static/weights", Duration::from_secs(1));

        let loaded = loader
            .load_models(&nets, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(loaded.base_path(), "/static/weights");
        let mut requested = nets.requested();
        requested.sort_by_key(|kind| kind.name());
        let mut expected = ModelKind::ALL.to_vec();
        expected.sort_by_key(|kind| kind.name());
        assert_eq!(requested, expected);
    }

    #[tokio::test]
    async fn any_failure_fails_the_set() {
        for failing in ModelKind::ALL {
            let nets = FakeModelNets::failing(failing);
            let loader = ModelLoader::new("/static/weights", Duration::from_secs(1));

            let err = loader
                .load_models(&nets, &CancellationToken::new())
                .await
                .unwrap_err();

            match err {
                MoodDetectorError::ModelLoad { model, .. } => assert_eq!(model, failing),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loads_run_concurrently() {
        // Each load takes one second; sequential loading would need four
        let nets = FakeModelNets::with_delay(Duration::from_secs(1));
        let loader = ModelLoader::new("/w", Duration::from_millis(1500));

        let started = tokio::time::Instant::now();
        loader
            .load_models(&nets, &CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_artifact_becomes_model_load_error() {
        let nets = FakeModelNets::stalled(ModelKind::FaceLandmark68);
        let loader = ModelLoader::new("/w", Duration::from_secs(2));

        let err = loader
            .load_models(&nets, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MoodDetectorError::ModelLoad {
                model: ModelKind::FaceLandmark68,
                ..
            }
        ));
    }

    #[test]
    fn artifact_files_are_named_after_the_model() {
        assert_eq!(ModelKind::FaceExpression.artifact_file(), "face_expression.onnx");
        assert_eq!(ModelKind::SsdMobilenetv1.artifact_file(), "ssd_mobilenetv1.onnx");
    }
}
