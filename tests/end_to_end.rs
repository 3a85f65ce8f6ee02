mod common;

use common::{spawn_mood_service, MoodService, Reply};
use mood_detector::camera::{VideoElement, VideoSurface};
use mood_detector::config::MoodConfig;
use mood_detector::loader::{ModelKind, ModelLoader};
use mood_detector::models::{Expression, FaceDetection};
use mood_detector::reporter::HttpMoodReporter;
use mood_detector::session::{SessionDeps, SessionOptions};
use mood_detector::testing::{
    face_with, FakeAnalyzer, FakeDevices, FakeModelNets, RecordingControl, RecordingNavigator,
};
use mood_detector::{CaptureSession, DetectTrigger, MoodDetectorError, SessionOutcome, SessionState};
use std::sync::Arc;

struct App {
    trigger: DetectTrigger,
    surface: Arc<VideoElement>,
    analyzer: Arc<FakeAnalyzer>,
    navigator: Arc<RecordingNavigator>,
    control: Arc<RecordingControl>,
}

fn app(
    service: &MoodService,
    nets: FakeModelNets,
    devices: FakeDevices,
    detection: Option<FaceDetection>,
) -> App {
    let config = MoodConfig {
        server_url: service.url.to_string(),
        ..MoodConfig::default()
    };
    let surface = Arc::new(VideoElement::new());
    let analyzer = Arc::new(FakeAnalyzer::returning(detection));
    let navigator = Arc::new(RecordingNavigator::default());
    let control = Arc::new(RecordingControl::new());
    let reporter = HttpMoodReporter::new(
        &service.url,
        &config.mood_endpoint,
        config.timeouts.report(),
    )
    .unwrap();

    let session = CaptureSession::new(
        SessionDeps {
            devices: Arc::new(devices),
            surface: surface.clone(),
            analyzer: analyzer.clone(),
            reporter: Arc::new(reporter),
            navigator: navigator.clone(),
        },
        SessionOptions {
            timeouts: config.timeouts.clone(),
            tie_break: config.tie_break,
            base_url: config.server_url().unwrap(),
        },
    );
    let trigger = DetectTrigger::new(
        control.clone(),
        ModelLoader::new(config.model_base_path.clone(), config.timeouts.model_load()),
        Arc::new(nets),
        session,
    );

    App {
        trigger,
        surface,
        analyzer,
        navigator,
        control,
    }
}

fn happy_face() -> Option<FaceDetection> {
    Some(face_with(&[
        (Expression::Happy, 0.8),
        (Expression::Sad, 0.1),
        (Expression::Neutral, 0.1),
    ]))
}

#[tokio::test]
async fn click_to_playlist_navigation() {
    common::init_tracing();
    let service = spawn_mood_service(Reply::Redirect("/playlist/")).await;
    let app = app(
        &service,
        FakeModelNets::default(),
        FakeDevices::granting(),
        happy_face(),
    );

    let outcome = app.trigger.activate().await.unwrap();

    let received = service.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, r#"{"mood":"happy"}"#);

    let expected = service.url.join("/playlist/happy").unwrap();
    match outcome {
        SessionOutcome::Reported { mood, navigated_to } => {
            assert_eq!(mood, Expression::Happy);
            assert_eq!(navigated_to.as_ref(), Some(&expected));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(app.navigator.visited(), vec![expected]);
    assert_eq!(app.analyzer.calls(), 1);
    assert_eq!(app.trigger.session().state(), SessionState::Reported);
    assert!(app.surface.is_visible());
    assert_eq!(app.control.history(), vec![false, true]);
}

#[tokio::test]
async fn missing_model_stops_before_camera_and_report() {
    let service = spawn_mood_service(Reply::Redirect("/playlist/")).await;
    let app = app(
        &service,
        FakeModelNets::failing(ModelKind::SsdMobilenetv1),
        FakeDevices::granting(),
        happy_face(),
    );

    let outcome = app.trigger.activate().await.unwrap();

    assert!(matches!(
        outcome,
        SessionOutcome::Failed(MoodDetectorError::ModelLoad { .. })
    ));
    assert_eq!(app.analyzer.calls(), 0);
    assert!(service.received().is_empty());
    assert!(app.navigator.visited().is_empty());
    // Shown on click, and left visible after the failure
    assert!(app.surface.is_visible());
}

#[tokio::test]
async fn denied_camera_reports_nothing() {
    let service = spawn_mood_service(Reply::Redirect("/playlist/")).await;
    let app = app(
        &service,
        FakeModelNets::default(),
        FakeDevices::denying("NotAllowedError: Permission denied"),
        happy_face(),
    );

    let outcome = app.trigger.activate().await.unwrap();

    assert!(matches!(
        outcome,
        SessionOutcome::Failed(MoodDetectorError::CameraAccess(_))
    ));
    assert_eq!(app.trigger.session().state(), SessionState::Error);
    assert!(service.received().is_empty());
    assert!(app.surface.is_visible());
}

#[tokio::test]
async fn no_face_reports_nothing() {
    let service = spawn_mood_service(Reply::Redirect("/playlist/")).await;
    let app = app(
        &service,
        FakeModelNets::default(),
        FakeDevices::granting(),
        None,
    );

    let outcome = app.trigger.activate().await.unwrap();

    assert!(matches!(outcome, SessionOutcome::NoFaceDetected));
    assert_eq!(app.trigger.session().state(), SessionState::NoFace);
    assert!(service.received().is_empty());
    assert!(app.navigator.visited().is_empty());
}

#[tokio::test]
async fn reply_without_redirect_stays_on_page() {
    let service = spawn_mood_service(Reply::NoRedirect).await;
    let app = app(
        &service,
        FakeModelNets::default(),
        FakeDevices::granting(),
        happy_face(),
    );

    let outcome = app.trigger.activate().await.unwrap();

    assert!(matches!(
        outcome,
        SessionOutcome::Reported {
            navigated_to: None,
            ..
        }
    ));
    assert_eq!(service.received().len(), 1);
    assert!(app.navigator.visited().is_empty());
}
