// In-memory collaborators for exercising sessions without camera, models or network

use crate::camera::{MediaConstraints, MediaDevices, MediaStream, VideoSurface};
use crate::error::{MoodDetectorError, Result};
use crate::inference::FaceAnalyzer;
use crate::loader::{LoadedModels, ModelKind, ModelNets};
use crate::models::{
    BoundingBox, Expression, ExpressionScores, FaceDetection, Frame, MoodReport, MoodResponse,
};
use crate::navigation::Navigator;
use crate::reporter::MoodReporter;
use crate::trigger::Control;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Model capability whose loads succeed unless told otherwise
#[derive(Default)]
pub struct FakeModelNets {
    requested: Mutex<Vec<ModelKind>>,
    failing: Option<ModelKind>,
    stalled: Option<ModelKind>,
    delay: Duration,
}

impl FakeModelNets {
    /// `kind` fails with a missing-file error
    pub fn failing(kind: ModelKind) -> Self {
        Self {
            failing: Some(kind),
            ..Self::default()
        }
    }

    /// `kind` never finishes loading
    pub fn stalled(kind: ModelKind) -> Self {
        Self {
            stalled: Some(kind),
            ..Self::default()
        }
    }

    /// Every load takes `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<ModelKind> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelNets for FakeModelNets {
    async fn load_from_uri(&self, kind: ModelKind, base_path: &str) -> Result<()> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(kind);
        }
        if self.stalled == Some(kind) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing == Some(kind) {
            return Err(MoodDetectorError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{base_path}/{}", kind.artifact_file()),
            )));
        }
        Ok(())
    }
}

/// Stream whose frames are pushed through a [`StreamFeed`]
pub struct FakeStream {
    label: String,
    frames: watch::Receiver<Option<Frame>>,
    released: Arc<AtomicBool>,
}

/// Producer side of a [`FakeStream`]
pub struct StreamFeed {
    sender: watch::Sender<Option<Frame>>,
    released: Arc<AtomicBool>,
}

impl FakeStream {
    pub fn new(label: &str) -> (FakeStream, StreamFeed) {
        let (sender, frames) = watch::channel(None);
        let released = Arc::new(AtomicBool::new(false));
        (
            FakeStream {
                label: label.to_string(),
                frames,
                released: released.clone(),
            },
            StreamFeed { sender, released },
        )
    }
}

impl MediaStream for FakeStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn frames(&self) -> watch::Receiver<Option<Frame>> {
        self.frames.clone()
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl StreamFeed {
    pub fn push(&self, frame: Frame) {
        self.sender.send_replace(Some(frame));
    }

    /// True once the stream handle was dropped
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

enum Grant {
    WithFrame,
    Frameless,
    Denied(String),
}

/// Camera that grants, denies, or grants a stream that never plays
pub struct FakeDevices {
    grant: Grant,
    feeds: Mutex<Vec<StreamFeed>>,
    requests: Mutex<Vec<MediaConstraints>>,
    surface: Option<Arc<dyn VideoSurface>>,
    visible_at_request: AtomicBool,
}

impl FakeDevices {
    fn with_grant(grant: Grant) -> Self {
        Self {
            grant,
            feeds: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            surface: None,
            visible_at_request: AtomicBool::new(false),
        }
    }

    /// Grants a stream that already holds a frame
    pub fn granting() -> Self {
        Self::with_grant(Grant::WithFrame)
    }

    /// Grants a stream that never delivers a frame
    pub fn frameless() -> Self {
        Self::with_grant(Grant::Frameless)
    }

    pub fn denying(reason: &str) -> Self {
        Self::with_grant(Grant::Denied(reason.to_string()))
    }

    /// Records whether `surface` was visible when access was requested
    pub fn watching(mut self, surface: Arc<dyn VideoSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn surface_was_visible_at_request(&self) -> bool {
        self.visible_at_request.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<Box<dyn MediaStream>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(constraints);
        }
        if let Some(surface) = &self.surface {
            self.visible_at_request
                .store(surface.is_visible(), Ordering::SeqCst);
        }

        let (stream, feed) = FakeStream::new("fake camera");
        match &self.grant {
            Grant::Denied(reason) => return Err(MoodDetectorError::CameraAccess(reason.clone())),
            Grant::WithFrame => feed.push(Frame::new(vec![128; 4 * 4 * 3], 4, 4)),
            Grant::Frameless => {}
        }
        if let Ok(mut feeds) = self.feeds.lock() {
            feeds.push(feed);
        }
        Ok(Box::new(stream))
    }
}

/// Builds a detection with the given expression scores
pub fn face_with(scores: &[(Expression, f32)]) -> FaceDetection {
    FaceDetection {
        bounding_box: BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 4.0,
            height: 4.0,
            score: 0.99,
        },
        landmarks: Vec::new(),
        expressions: scores.iter().copied().collect::<ExpressionScores>(),
    }
}

/// Analyzer returning a canned detection and counting calls
pub struct FakeAnalyzer {
    detection: Option<FaceDetection>,
    calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn returning(detection: Option<FaceDetection>) -> Self {
        Self {
            detection,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceAnalyzer for FakeAnalyzer {
    async fn detect_single_face(
        &self,
        _models: &LoadedModels,
        surface: &dyn VideoSurface,
    ) -> Result<Option<FaceDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if surface.current_frame().is_none() {
            return Err(MoodDetectorError::Inference(
                "no frame on the video surface".to_string(),
            ));
        }
        Ok(self.detection.clone())
    }
}

/// Reporter answering with a fixed response or failure
pub struct FakeReporter {
    response: std::result::Result<MoodResponse, String>,
    reports: Mutex<Vec<MoodReport>>,
}

impl FakeReporter {
    pub fn redirecting(target: &str) -> Self {
        Self::answering(Ok(MoodResponse {
            redirect: Some(target.to_string()),
            ..MoodResponse::default()
        }))
    }

    /// Succeeds without a redirect
    pub fn silent() -> Self {
        Self::answering(Ok(MoodResponse::default()))
    }

    pub fn failing(reason: &str) -> Self {
        Self::answering(Err(reason.to_string()))
    }

    fn answering(response: std::result::Result<MoodResponse, String>) -> Self {
        Self {
            response,
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn reports(&self) -> Vec<MoodReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MoodReporter for FakeReporter {
    async fn report(&self, report: MoodReport) -> Result<MoodResponse> {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
        self.response
            .clone()
            .map_err(MoodDetectorError::ReportTransport)
    }
}

/// Navigator remembering every destination
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<Url>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<Url> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, location: &Url) -> Result<()> {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(location.clone());
        }
        Ok(())
    }
}

/// Control remembering its enabled/disabled history
pub struct RecordingControl {
    enabled: AtomicBool,
    history: Mutex<Vec<bool>>,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn history(&self) -> Vec<bool> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Default for RecordingControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Control for RecordingControl {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if let Ok(mut history) = self.history.lock() {
            history.push(enabled);
        }
    }
}
