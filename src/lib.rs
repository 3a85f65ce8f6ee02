// Library exports for the mood detector

pub mod camera;
pub mod cancel;
pub mod config;
#[cfg(feature = "native")]
pub mod emotion;
pub mod error;
pub mod inference;
pub mod loader;
pub mod models;
pub mod mood;
pub mod navigation;
pub mod playback;
pub mod reporter;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod trigger;

pub use error::{MoodDetectorError, Result};
pub use session::{CaptureSession, SessionOutcome, SessionState};
pub use trigger::DetectTrigger;
