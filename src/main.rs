use mood_detector::camera::{NokhwaDevices, VideoElement};
use mood_detector::config::MoodConfig;
use mood_detector::emotion::OnnxFaceAnalyzer;
use mood_detector::error::{MoodDetectorError, Result};
use mood_detector::loader::ModelLoader;
use mood_detector::navigation::StdoutNavigator;
use mood_detector::reporter::HttpMoodReporter;
use mood_detector::session::{CaptureSession, SessionDeps, SessionOptions, SessionOutcome};
use mood_detector::trigger::{Control, DetectTrigger};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system (file only, stdout carries the redirect target)
fn init_logging() -> Result<()> {
    let log_file = std::fs::File::create("mood_detector.log").map_err(MoodDetectorError::Io)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    Ok(())
}

/// The "detect mood" control, rendered as a terminal prompt
struct TerminalControl;

impl Control for TerminalControl {
    fn set_enabled(&self, enabled: bool) {
        if enabled {
            eprintln!("Press Enter to detect your mood (q to quit)");
        } else {
            eprintln!("Detecting mood...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mood_detector.yaml"));
    let config = MoodConfig::load(&config_path)?.with_env()?;
    let server_url = config.server_url()?;

    match NokhwaDevices::list_devices() {
        Ok(devices) => info!("Cameras: {:?}", devices),
        Err(e) => error!("Camera query failed: {}", e),
    }

    let analyzer = Arc::new(OnnxFaceAnalyzer::new(config.min_face_confidence));
    let reporter = Arc::new(HttpMoodReporter::new(
        &server_url,
        &config.mood_endpoint,
        config.timeouts.report(),
    )?);

    let session = CaptureSession::new(
        SessionDeps {
            devices: Arc::new(NokhwaDevices::new(config.camera_index)),
            surface: Arc::new(VideoElement::new()),
            analyzer: analyzer.clone(),
            reporter,
            navigator: Arc::new(StdoutNavigator),
        },
        SessionOptions {
            timeouts: config.timeouts.clone(),
            tie_break: config.tie_break,
            base_url: server_url,
        },
    );

    let control = Arc::new(TerminalControl);
    let trigger = Arc::new(DetectTrigger::new(
        control.clone(),
        ModelLoader::new(config.model_base_path.clone(), config.timeouts.model_load()),
        analyzer,
        session,
    ));

    // Ctrl-C cancels a running detection
    let canceller = trigger.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    control.set_enabled(true);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "q" {
            break;
        }

        match trigger.activate().await {
            Ok(SessionOutcome::Reported {
                navigated_to: Some(location),
                ..
            }) => {
                info!("Left for {}", location);
                break;
            }
            Ok(SessionOutcome::Reported { mood, .. }) => eprintln!("Detected mood: {mood}"),
            Ok(SessionOutcome::NoFaceDetected) => eprintln!("No face detected."),
            Ok(SessionOutcome::Failed(e)) => eprintln!("Mood detection failed: {e}"),
            Err(e) => error!("{}", e),
        }
    }

    Ok(())
}
