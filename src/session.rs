// Capture-and-report session: camera, one-shot inference, mood report, navigation

use crate::cancel::{bounded, CancellationToken};
use crate::camera::{MediaConstraints, MediaDevices, VideoSurface};
use crate::config::Timeouts;
use crate::error::{MoodDetectorError, Result};
use crate::inference::FaceAnalyzer;
use crate::loader::LoadedModels;
use crate::models::{Expression, MoodReport};
use crate::mood::{dominant_mood, TieBreak};
use crate::navigation::{resolve_directive, Navigator};
use crate::reporter::MoodReporter;
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Suspension points of a detection, used to name timeouts and cancellations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ModelLoad,
    CameraAccess,
    PlaybackStart,
    Inference,
    MoodReport,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::ModelLoad => write!(f, "model loading"),
            Stage::CameraAccess => write!(f, "camera access"),
            Stage::PlaybackStart => write!(f, "playback start"),
            Stage::Inference => write!(f, "inference"),
            Stage::MoodReport => write!(f, "mood report"),
        }
    }
}

/// States of a capture session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingPermission,
    Streaming,
    Detecting,
    /// Mood reported; terminal
    Reported,
    /// Inference found no face; terminal
    NoFace,
    /// Terminal
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Reported | SessionState::NoFace | SessionState::Error
        )
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The mood was reported; `navigated_to` is set when the service redirected
    Reported {
        mood: Expression,
        navigated_to: Option<Url>,
    },
    NoFaceDetected,
    Failed(MoodDetectorError),
}

/// Collaborators a session is bound to
#[derive(Clone)]
pub struct SessionDeps {
    pub devices: Arc<dyn MediaDevices>,
    pub surface: Arc<dyn VideoSurface>,
    pub analyzer: Arc<dyn FaceAnalyzer>,
    pub reporter: Arc<dyn MoodReporter>,
    pub navigator: Arc<dyn Navigator>,
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub timeouts: Timeouts,
    pub tie_break: TieBreak,
    /// Base for resolving relative redirects
    pub base_url: Url,
}

/// Drives one detect-then-report pass over its video surface
pub struct CaptureSession {
    deps: SessionDeps,
    options: SessionOptions,
    state: watch::Sender<SessionState>,
}

impl CaptureSession {
    /// Creates a new CaptureSession in `Idle`
    pub fn new(deps: SessionDeps, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            deps,
            options,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watches state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Makes the video surface visible, ahead of model loading
    pub(crate) fn show_surface(&self) {
        self.deps.surface.show();
    }

    /// Marks the session failed before it could start, e.g. after a model load error
    pub(crate) fn fail(&self, err: &MoodDetectorError) {
        error!("Session aborted: {}", err);
        self.transition(SessionState::Error);
    }

    /// Runs the session to a terminal state.
    ///
    /// Every failure is logged and returned as `SessionOutcome::Failed`;
    /// nothing is retried.
    pub async fn run(&self, models: &LoadedModels, token: &CancellationToken) -> SessionOutcome {
        match self.drive(models, token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Mood detection failed: {}", e);
                self.transition(SessionState::Error);
                SessionOutcome::Failed(e)
            }
        }
    }

    async fn drive(&self, models: &LoadedModels, token: &CancellationToken) -> Result<SessionOutcome> {
        let timeouts = &self.options.timeouts;

        // Visible before the permission prompt
        self.deps.surface.show();
        self.transition(SessionState::AwaitingPermission);

        let stream = bounded(
            Stage::CameraAccess,
            timeouts.camera_access(),
            token,
            self.deps.devices.get_user_media(MediaConstraints::video_only()),
        )
        .await
        .map_err(|e| {
            error!("Error accessing webcam: {}", e);
            e
        })?;

        // Subscribe before binding so the first transition cannot be missed
        let playing = self.deps.surface.playback().once_playing();
        self.deps.surface.attach_stream(stream)?;
        self.transition(SessionState::Streaming);

        bounded(
            Stage::PlaybackStart,
            timeouts.playback_start(),
            token,
            playing.wait(),
        )
        .await?;
        info!("Video is playing");
        self.transition(SessionState::Detecting);

        let detection = bounded(
            Stage::Inference,
            timeouts.inference(),
            token,
            self.deps
                .analyzer
                .detect_single_face(models, self.deps.surface.as_ref()),
        )
        .await?;

        let Some(detection) = detection else {
            info!("No face detected");
            self.transition(SessionState::NoFace);
            return Ok(SessionOutcome::NoFaceDetected);
        };

        let mood = dominant_mood(&detection.expressions, self.options.tie_break).ok_or_else(
            || MoodDetectorError::Inference("detection carried no expression scores".to_string()),
        )?;
        info!("Detected mood: {}", mood);

        let response = bounded(
            Stage::MoodReport,
            timeouts.report(),
            token,
            self.deps.reporter.report(MoodReport { mood }),
        )
        .await?;

        if let Some(message) = &response.message {
            info!("{}", message);
        }

        let navigated_to = match response.navigation() {
            Some(directive) => {
                let location = resolve_directive(&self.options.base_url, &directive)?;
                self.deps.navigator.navigate(&location)?;
                Some(location)
            }
            None => {
                info!("Mood service sent no redirect");
                None
            }
        };

        self.transition(SessionState::Reported);
        Ok(SessionOutcome::Reported { mood, navigated_to })
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        info!("Session {:?} -> {:?}", previous, next);
    }
}
